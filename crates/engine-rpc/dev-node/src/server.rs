use crate::chain::{
    Committer,
    DevChain,
};

use anyhow::Result;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct DevNode {
    pub listener: TcpListener,
    pub chain: Arc<DevChain>,
    pub committer: Committer,
}

// Type alias for boxed future
pub type BoxedFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

impl DevNode {
    /// Start the API server and the committer.
    pub fn start(self, cancel_token: CancellationToken) -> (BoxedFuture, BoxedFuture) {
        let committer_handle = self.committer.run(cancel_token.clone());
        tracing::debug!("Started committer task");

        let api_handle = crate::api::serve(self.listener, self.chain, cancel_token);
        tracing::info!("Started API server");

        (Box::pin(api_handle), Box::pin(committer_handle))
    }

    /// Run the node until the cancellation token is cancelled.
    ///
    /// If either half fails, the other is cancelled and the error returned.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<()> {
        let (mut api_handle, mut committer_handle) = self.start(cancel_token.clone());

        tokio::select! {
            res = &mut api_handle => {
                if let Err(e) = &res {
                    metrics::counter!("api_server_errors_count").increment(1);
                    tracing::error!("API server encountered an error: {:?}", e);
                    cancel_token.cancel();
                }
                tracing::info!("Api stopped.");
                committer_handle.await?;
                tracing::info!("Committer stopped.");
                res
            }
            res = &mut committer_handle => {
                if let Err(e) = &res {
                    metrics::counter!("committer_errors_count").increment(1);
                    tracing::error!("Committer encountered an error: {:?}", e);
                }
                // The API cannot make progress without the committer.
                cancel_token.cancel();
                tracing::info!("Committer stopped.");
                api_handle.await?;
                tracing::info!("Api stopped.");
                res
            }
        }
    }
}

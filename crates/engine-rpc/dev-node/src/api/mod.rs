//! # `api`
//!
//! JSON-RPC 2.0 over HTTP for the development node.
//!
//! ## Engine methods
//!
//! ### `engine_createBlock`
//!
//! Seals a block on top of the head and queues it for commit.
//!
//! ```json
//! {
//!     "jsonrpc": "2.0",
//!     "method": "engine_createBlock",
//!     "params": [true, true, null],
//!     "id": 1
//! }
//! ```
//!
//! Parameters:
//! 1. `create_empty`: seal even if no transactions are pending
//! 2. `finalize`: finalize the block once committed
//! 3. `parent_hash`: must be `null` or the current head
//!
//! ```json
//! {
//!     "jsonrpc": "2.0",
//!     "result": {
//!         "hash": "0x5b2e...",
//!         "aux": {
//!             "header_only": false,
//!             "clear_justification_requests": false,
//!             "needs_justification": false,
//!             "bad_justification": false,
//!             "is_new_best": true
//!         }
//!     },
//!     "id": 1
//! }
//! ```
//!
//! ### `engine_finalizeBlock`
//!
//! `[hash, justification]`. Applied after every block sealed before it;
//! returns `true`.
//!
//! ## Chain methods
//!
//! `eth_sendRawTransaction`, `eth_blockNumber`, `eth_chainId`, `net_version`,
//! `eth_getBlockByNumber`, `eth_getBlockByHash`, and `eth_call` for the
//! block-hash history contract only. Queries read committed state.
//!
//! ## Error Codes
//!
//! - -32700: Parse error
//! - -32600: Invalid request, or a body over 10MB
//! - -32601: Method not found
//! - -32602: Invalid parameters, forking, unknown block
//! - -32603: Internal error, no transactions to include
//! - -32000: Execution is not supported

pub mod accept;
pub mod json_validation;
pub mod process_request;

use crate::chain::DevChain;

use std::{
    net::SocketAddr,
    sync::Arc,
};

use anyhow::Result;
use hyper_util::rt::TokioIo;
use tokio::net::{
    TcpListener,
    TcpStream,
};
use tokio_util::sync::CancellationToken;

/// Start the API server
pub async fn serve(
    listener: TcpListener,
    chain: Arc<DevChain>,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                tracing::info!("Api received cancellation signal, shutting down...");
                break;
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, socketaddr)) => {
                        serve_connection(socketaddr, &chain, cancel_token.clone(), stream);
                    }
                    Err(err) => {
                        tracing::error!(?err, "Error accepting connection");
                    }
                }
            }
        }
    }

    Ok(())
}

fn serve_connection(
    socketaddr: SocketAddr,
    chain: &Arc<DevChain>,
    shutdown_token: CancellationToken,
    stream: TcpStream,
) {
    tracing::debug!("Connection from: {}", socketaddr);

    // Use an adapter to access something implementing `tokio::io` traits as if they implement
    // `hyper::rt` IO traits.
    let io = TokioIo::new(stream);
    let chain = chain.clone();

    // Spawn a tokio task to serve multiple connections concurrently
    tokio::task::spawn(async move {
        tokio::select! {
            () = shutdown_token.cancelled() => {}
            () = async { crate::accept!(io, chain, socketaddr); } => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::ChainConfig,
        config::Sealing,
    };
    use std::{
        num::NonZeroU64,
        time::Duration,
    };

    #[tokio::test]
    async fn test_serve() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (chain, committer) = DevChain::new(ChainConfig {
            chain_id: 42,
            block_hash_count: NonZeroU64::new(256).unwrap(),
            commit_delay: Duration::ZERO,
            sealing: Sealing::Manual,
        });

        let cancel_token = CancellationToken::new();
        tokio::spawn(committer.run(cancel_token.clone()));
        let server_handle = tokio::spawn(serve(listener, chain, cancel_token.clone()));

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}"))
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": "eth_blockNumber",
                "params": [],
                "id": 1
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["result"], "0x0");

        let health_response = client
            .get(format!("http://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(health_response.status(), 200);
        assert_eq!(health_response.text().await.unwrap(), "ok");

        let get_response = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(get_response.status(), 405);

        cancel_token.cancel();
        server_handle.await.unwrap().unwrap();
    }
}

use engine_dev_node::{
    Config,
    DEFAULT_BLOCK_HASH_WINDOW,
    Sealing,
    chain::DevChain,
};

use std::{
    net::SocketAddr,
    sync::Arc,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

/// Dev node configuration bound to a random local port.
pub fn test_config() -> Config {
    Config {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        chain_id: 42,
        block_hash_count: DEFAULT_BLOCK_HASH_WINDOW,
        commit_delay_ms: 0,
        sealing: Sealing::Manual,
        log_level: LevelFilter::current(),
    }
}

/// A development node running in the current runtime. Stopped on drop.
pub struct TestDevNode {
    addr: SocketAddr,
    chain: Arc<DevChain>,
    cancel_token: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestDevNode {
    /// Spawns a node with [`test_config`].
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: Config) -> anyhow::Result<Self> {
        let node = config.build().await?;
        let addr = node.listener.local_addr()?;
        let chain = node.chain.clone();

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel_token.clone()));

        Ok(Self {
            addr,
            chain,
            cancel_token,
            handle,
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Direct handle on the node's chain, bypassing JSON-RPC.
    pub fn chain(&self) -> &Arc<DevChain> {
        &self.chain
    }

    /// Cancels the node and waits for it to stop.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.cancel_token.cancel();
        (&mut self.handle).await?
    }
}

impl Drop for TestDevNode {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

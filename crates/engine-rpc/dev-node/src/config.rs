use std::{
    net::SocketAddr,
    num::NonZeroU64,
    time::Duration,
};

use clap::{
    Parser,
    ValueEnum,
};
use engine_rpc_core::DEFAULT_BLOCK_HASH_COUNT;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;

use crate::{
    chain::{
        ChainConfig,
        DevChain,
    },
    server::DevNode,
};

/// Default `--block-hash-count`.
pub const DEFAULT_BLOCK_HASH_WINDOW: NonZeroU64 = match NonZeroU64::new(DEFAULT_BLOCK_HASH_COUNT) {
    Some(count) => count,
    None => NonZeroU64::MIN,
};

/// When the node seals blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Sealing {
    /// Only on `engine_createBlock`.
    #[default]
    Manual,
    /// One finalized block per accepted raw transaction.
    Instant,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// JSON-RPC server address
    #[arg(long, env = "ENGINE_LISTEN_ADDR", default_value = "0.0.0.0:8545")]
    pub listen_addr: SocketAddr,
    /// Chain id reported by `eth_chainId`
    #[arg(long, env = "ENGINE_CHAIN_ID", default_value = "42")]
    pub chain_id: u64,
    /// Number of recent block hashes served by the history query
    #[arg(long, env = "ENGINE_BLOCK_HASH_COUNT", default_value_t = DEFAULT_BLOCK_HASH_WINDOW)]
    pub block_hash_count: NonZeroU64,
    /// Delay between acknowledging a block and committing it, in milliseconds
    #[arg(long, env = "ENGINE_COMMIT_DELAY_MS", default_value = "0")]
    pub commit_delay_ms: u64,
    /// Block sealing mode
    #[arg(long, env = "ENGINE_SEALING", value_enum, default_value = "manual")]
    pub sealing: Sealing,
    /// Log level
    #[arg(long, env = "ENGINE_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            chain_id: self.chain_id,
            block_hash_count: self.block_hash_count,
            commit_delay: Duration::from_millis(self.commit_delay_ms),
            sealing: self.sealing,
        }
    }

    /// Build the development node
    pub async fn build(self) -> anyhow::Result<DevNode> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!(listen_addr = ?self.listen_addr, "Listening on address");

        let (chain, committer) = DevChain::new(self.chain_config());
        tracing::info!(
            chain_id = self.chain_id,
            block_hash_count = self.block_hash_count.get(),
            sealing = ?self.sealing,
            genesis = %chain.genesis_hash(),
            "Initialized chain"
        );

        Ok(DevNode {
            listener,
            chain,
            committer,
        })
    }
}

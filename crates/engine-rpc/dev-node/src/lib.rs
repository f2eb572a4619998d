//! Development node for the engine RPC toolkit.
//!
//! Serves the engine block commands, the `eth_*` block queries and the
//! block-hash history query over JSON-RPC, with a configurable gap between
//! acknowledging a block and committing it.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod chain;
mod config;
mod server;

pub use config::{
    Config,
    DEFAULT_BLOCK_HASH_WINDOW,
    Sealing,
};
pub use server::DevNode;

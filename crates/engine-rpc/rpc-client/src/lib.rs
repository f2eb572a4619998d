//! Client side of the engine RPC toolkit.
//!
//! [`RpcClient`] correlates JSON-RPC replies to the calls that issued them over
//! any [`Transport`]. [`BlockEngine`] drives block production on top of it.

mod chain;
mod client;
mod engine;
mod error;
pub mod transport;

pub use client::{
    ClientConfig,
    DEFAULT_REQUEST_TIMEOUT,
    RpcClient,
};
pub use engine::{
    BlockAck,
    BlockEngine,
    DEFAULT_SETTLING_DELAY,
    EngineConfig,
    Settlement,
};
pub use error::{
    ClientError,
    TransportError,
};
pub use transport::{
    ChannelPeer,
    ChannelTransport,
    HttpTransport,
    Transport,
    WsTransport,
};

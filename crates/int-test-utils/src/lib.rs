#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

mod dev_node;
pub use dev_node::{
    TestDevNode,
    test_config,
};

mod mock_rpc_server;
pub use mock_rpc_server::MockRpcServer;

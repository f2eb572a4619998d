use engine_dev_node::Config;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    EnvFilter,
    fmt,
    prelude::*,
};

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize a tracing subscriber. `RUST_LOG` directives refine the level.
    let filter = EnvFilter::builder()
        .with_default_directive(config.log_level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let node = config.build().await?;
    let cancellation_token = CancellationToken::new();

    let mut boxed_server_future = Box::pin(node.run(cancellation_token.clone()));

    tokio::select! {
        result = &mut boxed_server_future => {
            handle_server_result(result);
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C signal, initiating graceful shutdown");
            cancellation_token.cancel();
            handle_server_result(boxed_server_future.await);
        }
    }

    Ok(())
}

/// Handle the result of the server
fn handle_server_result(result: Result<()>) {
    match result {
        Ok(()) => tracing::info!("Node shutdown gracefully"),
        Err(e) => {
            tracing::error!("Node encountered an error: {}", e);
        }
    }
}

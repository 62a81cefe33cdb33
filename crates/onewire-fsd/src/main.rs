mod cli;
mod demo;
mod server;

use clap::Parser;
use cli::Cli;
use onewire_core::Core;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.core_config();
    let chain = demo::build_chain(cli.remote_bus);
    let core = Arc::new(Core::new(chain, config));

    let listener = TcpListener::bind(cli.bind).await?;
    tracing::info!(addr = %cli.bind, readonly = cli.readonly, "onewire-fsd listening");

    server::serve(core, listener).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

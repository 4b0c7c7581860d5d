use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use filedrop::config::Config;
use filedrop::server;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    tokio::fs::create_dir_all(&config.dir).await?;
    let dir = tokio::fs::canonicalize(&config.dir).await?;

    let listener = TcpListener::bind(config.addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, dir = %dir.display(), "listening, files will be written to the upload directory");

    server::serve(listener, config.state(), shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(e) => {
            tracing::error!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    }
}

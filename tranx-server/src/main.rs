//! The tranx rendezvous server binary.
//!
//! Usage: `tranx-server [port]` (defaults to port 80).

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tranx_server::mailbox::Registry;
use tranx_server::{Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let port = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u16>()?,
        None => tranx_core::DEFAULT_TRANX_PORT,
    };

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "tranx server listening");

    let server = Server::new(ServerConfig::default(), Registry::default());
    server
        .serve_with_shutdown(listener, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received");
        })
        .await;

    Ok(())
}

//! The tranx rendezvous server.
//!
//! Pairs a sender and a receiver that hold the same transfer password,
//! brokers their PAKE handshake and, when no direct connection is possible,
//! relays their encrypted traffic. The server never sees plaintext: all it
//! learns is a password hash and the sizes of opaque frames.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod handlers;
pub mod mailbox;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

use crate::mailbox::{Registry, RegistryError};

/// How long draining connections get during shutdown before being aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Path a sender connects to.
pub const SENDER_PATH: &str = "/establish-sender";
/// Path a receiver connects to.
pub const RECEIVER_PATH: &str = "/establish-receiver";

/// Errors raised by individual connection handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A client sent something that is not the expected rendezvous message.
    #[error(transparent)]
    Protocol(#[from] tranx_core::ProtocolError),
    /// Mailbox lookup or claim failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The websocket failed underneath us.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// No receiver joined the mailbox in time.
    #[error("no receiver connected before the timeout")]
    ReceiverTimeout,
    /// The paired handler went away mid-handshake.
    #[error("paired connection closed during the handshake")]
    PeerGone,
}

/// Tunables for a server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a sender may wait for its receiver.
    pub receiver_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            receiver_timeout: tranx_core::RECEIVER_CONNECT_TIMEOUT,
        }
    }
}

/// A rendezvous server instance. All state lives in the injected
/// [`Registry`], so independent instances never share anything.
pub struct Server {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Registry,
}

impl Server {
    /// Creates a server with the given configuration and state registry.
    pub fn new(config: ServerConfig, registry: Registry) -> Arc<Self> {
        Arc::new(Self { config, registry })
    }

    /// The server's state registry, exposed for inspection in tests.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Accepts connections forever.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        self.serve_with_shutdown(listener, std::future::pending())
            .await;
    }

    /// Accepts connections until `shutdown` resolves, then gives in-flight
    /// sessions a grace period to finish.
    pub async fn serve_with_shutdown(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        sessions.spawn(handle_connection(Arc::clone(&self), stream));
                    }
                    Err(error) => warn!(%error, "accept failed"),
                },
                _ = &mut shutdown => break,
            }
        }

        info!(in_flight = sessions.len(), "shutting down, draining sessions");
        let grace = tokio::time::sleep(SHUTDOWN_GRACE);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                finished = sessions.join_next() => if finished.is_none() { break },
                _ = &mut grace => {
                    warn!(still_running = sessions.len(), "grace period over, aborting sessions");
                    sessions.shutdown().await;
                    break;
                }
            }
        }
    }
}

/// Upgrades the connection and routes it by request path. Unknown paths get
/// a plain 404 instead of a websocket.
async fn handle_connection(server: Arc<Server>, stream: TcpStream) {
    let mut path = String::new();
    let callback = |request: &Request, response: Response| {
        path = request.uri().path().to_owned();
        if path == SENDER_PATH || path == RECEIVER_PATH {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(None);
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(error) => {
            debug!(%error, path, "websocket upgrade rejected");
            return;
        }
    };

    match path.as_str() {
        SENDER_PATH => handlers::handle_sender(server, ws).await,
        RECEIVER_PATH => handlers::handle_receiver(server, ws).await,
        // unreachable after the callback check, but don't panic on it
        _ => debug!(path, "dropping connection on unknown path"),
    }
}

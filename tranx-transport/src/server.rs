//! The sender's direct-transfer endpoint.
//!
//! Bound on a free port before the sender handshake advertises it. Only
//! the receiver address negotiated over the encrypted channel is allowed
//! to upgrade; anything else gets a 403 and the endpoint keeps listening.

use std::net::IpAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use crate::error::TransportError;

/// Path the receiver dials for a direct transfer.
pub(crate) const TRANSFER_PATH: &str = "/transfer";

pub(crate) struct DirectServer {
    port: u16,
    accepted: oneshot::Receiver<WebSocketStream<TcpStream>>,
    shutdown: oneshot::Sender<()>,
}

impl DirectServer {
    /// Binds a free port and starts accepting in the background.
    pub(crate) async fn start(allowed_ip: IpAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
        let port = listener.local_addr()?.port();
        let (accepted_tx, accepted) = oneshot::channel();
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                let (stream, peer) = tokio::select! {
                    _ = &mut shutdown_rx => return,
                    incoming = listener.accept() => match incoming {
                        Ok(accepted) => accepted,
                        Err(error) => {
                            warn!(%error, "direct endpoint accept failed");
                            return;
                        }
                    },
                };

                if peer.ip() != allowed_ip {
                    warn!(%peer, "rejecting direct connection from unexpected address");
                    let _ = accept_hdr_async(stream, forbid).await;
                    continue;
                }

                match accept_hdr_async(stream, accept_transfer_path).await {
                    Ok(ws) => {
                        debug!(%peer, "direct connection established");
                        let _ = accepted_tx.send(ws);
                        return;
                    }
                    Err(error) => {
                        // a broken upgrade from the negotiated peer will not
                        // recover; dropping the channel aborts the transfer
                        warn!(%peer, %error, "direct upgrade failed");
                        return;
                    }
                }
            }
        });

        Ok(Self {
            port,
            accepted,
            shutdown,
        })
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the negotiated receiver to connect.
    pub(crate) async fn wait_for_connection(
        self,
    ) -> Result<WebSocketStream<TcpStream>, TransportError> {
        self.accepted.await.map_err(|_| {
            TransportError::DirectServer("endpoint closed before the peer connected".into())
        })
    }

    /// Stops the endpoint. Used when the receiver picked the relay route.
    pub(crate) fn close(self) {
        let _ = self.shutdown.send(());
    }
}

fn forbid(_request: &Request, _response: Response) -> Result<Response, ErrorResponse> {
    let mut rejection = ErrorResponse::new(None);
    *rejection.status_mut() = StatusCode::FORBIDDEN;
    Err(rejection)
}

fn accept_transfer_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == TRANSFER_PATH {
        Ok(response)
    } else {
        let mut rejection = ErrorResponse::new(None);
        *rejection.status_mut() = StatusCode::NOT_FOUND;
        Err(rejection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_tungstenite::connect_async;

    #[tokio::test]
    async fn rejects_a_peer_that_was_not_negotiated() {
        let server = DirectServer::start("203.0.113.9".parse().unwrap())
            .await
            .unwrap();
        let url = format!("ws://127.0.0.1:{}{}", server.port(), TRANSFER_PATH);

        let upgrade = connect_async(&url).await;
        assert!(upgrade.is_err(), "loopback peer must be turned away");

        // the endpoint keeps listening after a rejected peer
        let second = connect_async(&url).await;
        assert!(second.is_err());
        server.close();
    }

    #[tokio::test]
    async fn accepts_the_negotiated_peer_on_the_transfer_path() {
        let server = DirectServer::start("127.0.0.1".parse().unwrap())
            .await
            .unwrap();
        let url = format!("ws://127.0.0.1:{}{}", server.port(), TRANSFER_PATH);

        let dial = tokio::spawn(async move { connect_async(&url).await });
        let accepted = server.wait_for_connection().await;
        assert!(accepted.is_ok());
        assert!(dial.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn wrong_path_aborts_the_transfer() {
        let server = DirectServer::start("127.0.0.1".parse().unwrap())
            .await
            .unwrap();
        let url = format!("ws://127.0.0.1:{}/not-the-transfer-path", server.port());

        let upgrade = connect_async(&url).await;
        assert!(upgrade.is_err());
        assert!(server.wait_for_connection().await.is_err());
    }
}

//! The receiving client.
//!
//! Joins the mailbox named by the transfer password, finishes the PAKE
//! handshake, then probes the sender for a direct connection before
//! settling for the relay.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use tranx_core::{Crypt, KeyExchange, Password, RendezvousMessage, TransferMessage};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::server::TRANSFER_PATH;
use crate::stream::TransferStream;
use crate::transfer::{self, Progress};

/// Receiver-side endpoint path on the tranx server.
const ESTABLISH_PATH: &str = "/establish-receiver";

/// Overall window for the direct-connection probe.
const PROBE_WINDOW: Duration = Duration::from_secs(3);
/// First probe attempt timeout; doubles on every retry.
const PROBE_INITIAL_DELAY: Duration = Duration::from_millis(250);

/// A receiver that finished negotiation and is ready to pull the payload.
pub struct Receiver {
    stream: TransferStream,
    crypt: Crypt,
    payload_size: u64,
    used_relay: bool,
}

impl Receiver {
    /// Connects, authenticates with the password and negotiates the
    /// transport route. On success the payload is ready to be received.
    pub async fn connect(
        config: &ClientConfig,
        password: Password,
    ) -> Result<Self, TransportError> {
        config.resolve()?;
        let (ws, _) = connect_async(config.endpoint_url(ESTABLISH_PATH)).await?;
        let mut stream = TransferStream::Dialed(ws);

        // curve setup is CPU work; overlap it with the network round trips
        let pake_password = password.clone();
        let pake_init = tokio::task::spawn_blocking(move || KeyExchange::start(&pake_password));

        stream
            .send_rendezvous(&RendezvousMessage::ReceiverToTranxEstablish {
                password: password.hashed(),
            })
            .await?;

        let sender_pake = match stream
            .recv_rendezvous()
            .await
            .map_err(|_| TransportError::NegotiationFailed)?
        {
            RendezvousMessage::TranxToReceiverPake { bytes } => bytes,
            other => return Err(other.unexpected("TranxToReceiverPake").into()),
        };

        let (exchange, our_pake) = pake_init
            .await
            .map_err(|_| TransportError::NegotiationFailed)?;
        stream
            .send_rendezvous(&RendezvousMessage::ReceiverToTranxPake { bytes: our_pake })
            .await?;
        let key = exchange
            .finish(&sender_pake)
            .map_err(|_| TransportError::NegotiationFailed)?;

        let salt = match stream.recv_rendezvous().await? {
            RendezvousMessage::TranxToReceiverSalt { salt } => salt,
            other => return Err(other.unexpected("TranxToReceiverSalt").into()),
        };
        let crypt = Crypt::new(&key, Some(salt))?;
        info!("session keys negotiated");

        let local_ip = stream.local_addr()?.ip();
        stream
            .send_encrypted(&TransferMessage::ReceiverHandshake { ip: local_ip }, &crypt)
            .await?;

        let (sender_ip, sender_port, payload_size) = match stream
            .recv_encrypted(&crypt)
            .await
            .map_err(TransportError::negotiation)?
        {
            TransferMessage::SenderHandshake {
                ip,
                port,
                payload_size,
            } => (ip, port, payload_size),
            other => return Err(other.unexpected("SenderHandshake").into()),
        };

        let direct = if config.force_relay {
            None
        } else {
            probe_direct(sender_ip, sender_port).await.ok()
        };

        match direct {
            Some(ws) => {
                debug!("direct connection available");
                stream
                    .send_encrypted(&TransferMessage::ReceiverDirectCommunication, &crypt)
                    .await?;
                // the rendezvous connection is no longer needed
                stream
                    .send_rendezvous(&RendezvousMessage::ReceiverToTranxClose)
                    .await?;
                stream.close().await;
                Ok(Self {
                    stream: TransferStream::Dialed(ws),
                    crypt,
                    payload_size,
                    used_relay: false,
                })
            }
            None => {
                debug!("falling back to the relay");
                stream
                    .send_encrypted(&TransferMessage::ReceiverRelayCommunication, &crypt)
                    .await?;
                match stream.recv_encrypted(&crypt).await? {
                    TransferMessage::SenderRelayAck => {}
                    other => return Err(other.unexpected("SenderRelayAck").into()),
                }
                Ok(Self {
                    stream,
                    crypt,
                    payload_size,
                    used_relay: true,
                })
            }
        }
    }

    /// Size of the payload the sender advertised.
    pub fn payload_size(&self) -> u64 {
        self.payload_size
    }

    /// Whether the transfer goes through the relay instead of directly.
    pub fn used_relay(&self) -> bool {
        self.used_relay
    }

    /// Pulls the payload into `writer`. Returns the number of bytes
    /// written.
    pub async fn receive<W>(
        mut self,
        writer: &mut W,
        progress: Option<mpsc::UnboundedSender<Progress>>,
    ) -> Result<u64, TransportError>
    where
        W: AsyncWrite + Unpin,
    {
        let received = transfer::receive_payload(
            &mut self.stream,
            &self.crypt,
            writer,
            self.payload_size,
            &progress,
        )
        .await?;
        self.stream.close().await;
        info!(bytes = received, "payload received");
        Ok(received)
    }
}

/// Tries to reach the sender's direct endpoint, with per-attempt timeouts
/// that start small and double, inside one overall window.
async fn probe_direct(
    ip: IpAddr,
    port: u16,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, TransportError> {
    let url = format!("ws://{}{}", SocketAddr::new(ip, port), TRANSFER_PATH);
    let attempts = async {
        let mut delay = PROBE_INITIAL_DELAY;
        loop {
            match tokio::time::timeout(delay, connect_async(&url)).await {
                Ok(Ok((ws, _))) => return ws,
                Ok(Err(_)) => tokio::time::sleep(delay).await,
                Err(_) => {}
            }
            delay *= 2;
        }
    };
    tokio::time::timeout(PROBE_WINDOW, attempts)
        .await
        .map_err(|_| TransportError::ProbeTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_gives_up_within_the_window_on_a_closed_port() {
        // bind and drop to get a port that refuses connections
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let started = Instant::now();
        let probed = probe_direct("127.0.0.1".parse().unwrap(), port).await;
        assert!(matches!(probed, Err(TransportError::ProbeTimeout)));
        assert!(started.elapsed() < PROBE_WINDOW + Duration::from_secs(1));
    }
}

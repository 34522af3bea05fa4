//! The sending client.
//!
//! Connects to the tranx server, obtains a transfer password, runs the
//! PAKE handshake once the receiver shows up, then serves the payload
//! either directly or through the relay, whichever the receiver picked.

use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tracing::{debug, info};

use tranx_core::{
    Crypt, KeyExchange, Password, ProtocolError, RendezvousMessage, TransferMessage,
    MAX_CHUNK_BYTES, MAX_SEND_CHUNKS,
};

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::server::DirectServer;
use crate::stream::TransferStream;
use crate::transfer::{self, Payload, Progress};

/// Sender-side endpoint path on the tranx server.
const ESTABLISH_PATH: &str = "/establish-sender";

/// A sender bound to a mailbox on the tranx server, before the receiver
/// has joined.
pub struct Sender {
    stream: TransferStream,
    password: Password,
}

impl Sender {
    /// Connects to the tranx server and establishes a mailbox. The returned
    /// password is what the receiving side must be told out of band.
    pub async fn connect(config: &ClientConfig) -> Result<(Self, Password), TransportError> {
        config.resolve()?;
        let (ws, _) = connect_async(config.endpoint_url(ESTABLISH_PATH)).await?;
        let mut stream = TransferStream::Dialed(ws);

        let id = match stream.recv_rendezvous().await? {
            RendezvousMessage::TranxToSenderBind { id } => id,
            other => return Err(other.unexpected("TranxToSenderBind").into()),
        };
        let password = Password::generate(id);
        stream
            .send_rendezvous(&RendezvousMessage::SenderToTranxEstablish {
                password: password.hashed(),
            })
            .await?;
        debug!(id, "mailbox established");

        Ok((
            Self {
                stream,
                password: password.clone(),
            },
            password,
        ))
    }

    /// Waits for the receiver, negotiates keys and transport, and serves
    /// the payload. The payload arrives through a channel so that whatever
    /// prepares it (reading or packing files) can run while the sender
    /// waits for its peer.
    pub async fn transfer(
        mut self,
        payload_ready: oneshot::Receiver<Payload>,
        progress: Option<mpsc::UnboundedSender<Progress>>,
    ) -> Result<(), TransportError> {
        let (exchange, our_pake) = KeyExchange::start(&self.password);

        match self.stream.recv_rendezvous().await? {
            RendezvousMessage::TranxToSenderReady => {}
            other => return Err(other.unexpected("TranxToSenderReady").into()),
        }
        info!("receiver joined, negotiating keys");

        self.stream
            .send_rendezvous(&RendezvousMessage::SenderToTranxPake { bytes: our_pake })
            .await?;
        let peer_pake = match self.stream.recv_rendezvous().await? {
            RendezvousMessage::TranxToSenderPake { bytes } => bytes,
            other => return Err(other.unexpected("TranxToSenderPake").into()),
        };
        let key = exchange
            .finish(&peer_pake)
            .map_err(|_| TransportError::NegotiationFailed)?;
        let crypt = Crypt::new(&key, None)?;
        self.stream
            .send_rendezvous(&RendezvousMessage::SenderToTranxSalt {
                salt: crypt.salt().to_vec(),
            })
            .await?;

        let receiver_ip = match self
            .stream
            .recv_encrypted(&crypt)
            .await
            .map_err(TransportError::negotiation)?
        {
            TransferMessage::ReceiverHandshake { ip } => ip,
            other => return Err(other.unexpected("ReceiverHandshake").into()),
        };

        let payload = payload_ready
            .await
            .map_err(|_| TransportError::PayloadUnavailable)?;
        if payload.size > MAX_CHUNK_BYTES as u64 * MAX_SEND_CHUNKS {
            return Err(ProtocolError::PayloadTooLarge(payload.size).into());
        }

        let direct = DirectServer::start(receiver_ip).await?;
        let local_ip = self.stream.local_addr()?.ip();
        self.stream
            .send_encrypted(
                &TransferMessage::SenderHandshake {
                    ip: local_ip,
                    port: direct.port(),
                    payload_size: payload.size,
                },
                &crypt,
            )
            .await?;

        match self.stream.recv_encrypted(&crypt).await? {
            TransferMessage::ReceiverDirectCommunication => {
                debug!("receiver chose the direct route");
                // the receiver may already have left the rendezvous
                // connection, so the ack is best-effort
                let _ = self
                    .stream
                    .send_encrypted(&TransferMessage::SenderDirectAck, &crypt)
                    .await;
                let mut direct_stream = TransferStream::Accepted(direct.wait_for_connection().await?);
                transfer::send_payload(&mut direct_stream, &crypt, payload, &progress).await?;
                direct_stream.close().await;
            }
            TransferMessage::ReceiverRelayCommunication => {
                debug!("receiver fell back to the relay");
                direct.close();
                self.stream
                    .send_encrypted(&TransferMessage::SenderRelayAck, &crypt)
                    .await?;
                transfer::send_payload(&mut self.stream, &crypt, payload, &progress).await?;
                // tell the tranx server the mailbox can go; the receiver
                // closing its end may already have torn it down
                let _ = self
                    .stream
                    .send_rendezvous(&RendezvousMessage::SenderToTranxClose)
                    .await;
            }
            other => {
                return Err(other
                    .unexpected("ReceiverDirectCommunication or ReceiverRelayCommunication")
                    .into())
            }
        }

        self.stream.close().await;
        info!("transfer complete");
        Ok(())
    }
}

//! Websocket stream abstraction shared by the handshake and the transfer
//! executor.
//!
//! Both the relay connection (dialed out to the tranx server) and a direct
//! connection (dialed to, or accepted from, the peer) end up as a
//! [`TransferStream`], so everything above this module is oblivious to
//! which route was negotiated.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tranx_core::{Crypt, RendezvousMessage, TransferMessage};

use crate::error::TransportError;

/// One websocket connection, either dialed by us or accepted by our
/// direct-transfer endpoint.
pub(crate) enum TransferStream {
    Dialed(WebSocketStream<MaybeTlsStream<TcpStream>>),
    Accepted(WebSocketStream<TcpStream>),
}

impl TransferStream {
    /// Sends one binary frame.
    pub(crate) async fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        let message = Message::Binary(bytes);
        match self {
            TransferStream::Dialed(ws) => ws.send(message).await?,
            TransferStream::Accepted(ws) => ws.send(message).await?,
        }
        Ok(())
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let message = Message::Text(text);
        match self {
            TransferStream::Dialed(ws) => ws.send(message).await?,
            TransferStream::Accepted(ws) => ws.send(message).await?,
        }
        Ok(())
    }

    /// Receives the next data frame. Ping and pong are transparent; a close
    /// frame or stream end surfaces as [`TransportError::ConnectionClosed`].
    pub(crate) async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            let next = match self {
                TransferStream::Dialed(ws) => ws.next().await,
                TransferStream::Accepted(ws) => ws.next().await,
            };
            match next {
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(error)) => return Err(error.into()),
            }
        }
    }

    /// The local address of the underlying socket. Used to tell the peer
    /// which IP to expect for a direct connection.
    pub(crate) fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        match self {
            TransferStream::Dialed(ws) => match ws.get_ref() {
                MaybeTlsStream::Plain(stream) => Ok(stream.local_addr()?),
                _ => Err(TransportError::ConnectionClosed),
            },
            TransferStream::Accepted(ws) => Ok(ws.get_ref().local_addr()?),
        }
    }

    /// Best-effort close.
    pub(crate) async fn close(&mut self) {
        match self {
            TransferStream::Dialed(ws) => {
                let _ = ws.close(None).await;
            }
            TransferStream::Accepted(ws) => {
                let _ = ws.close(None).await;
            }
        }
    }

    /// Sends a cleartext rendezvous message, as a text frame.
    pub(crate) async fn send_rendezvous(
        &mut self,
        message: &RendezvousMessage,
    ) -> Result<(), TransportError> {
        self.send_text(message.to_json()?).await
    }

    /// Reads the next frame as a cleartext rendezvous message.
    pub(crate) async fn recv_rendezvous(&mut self) -> Result<RendezvousMessage, TransportError> {
        let raw = self.recv().await?;
        Ok(RendezvousMessage::from_slice(&raw)?)
    }

    /// Encrypts and sends a transfer message.
    pub(crate) async fn send_encrypted(
        &mut self,
        message: &TransferMessage,
        crypt: &Crypt,
    ) -> Result<(), TransportError> {
        let sealed = crypt.encrypt(message.to_json()?.as_bytes())?;
        self.send(sealed).await
    }

    /// Receives and decrypts the next frame as a transfer message.
    pub(crate) async fn recv_encrypted(
        &mut self,
        crypt: &Crypt,
    ) -> Result<TransferMessage, TransportError> {
        let raw = self.recv().await?;
        let plaintext = crypt.decrypt(&raw)?;
        Ok(TransferMessage::from_slice(&plaintext)?)
    }
}

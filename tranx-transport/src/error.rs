//! Transport error types.

use thiserror::Error;

use tranx_core::ProtocolError;

/// Errors surfaced by the sender and receiver clients.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A peer or the server sent something the protocol does not allow here.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The websocket failed underneath us.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// The remote end closed the connection.
    #[error("connection closed by remote")]
    ConnectionClosed,
    /// The configured rendezvous address does not resolve.
    #[error("could not resolve tranx address {0:?}")]
    AddressResolution(String),
    /// Key agreement or decryption failed during the handshake. The usual
    /// cause is a mistyped password.
    #[error("connection negotiation failed, check the password")]
    NegotiationFailed,
    /// No direct connection could be made within the probe window.
    #[error("direct connection probe timed out")]
    ProbeTimeout,
    /// The payload channel was dropped before a payload arrived.
    #[error("payload channel closed before the payload was ready")]
    PayloadUnavailable,
    /// The local direct-transfer endpoint failed.
    #[error("direct transfer endpoint failed: {0}")]
    DirectServer(String),
    /// Reading the payload source or writing the destination failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Collapses handshake-phase crypto failures into the one error a user
    /// can act on.
    pub(crate) fn negotiation(self) -> Self {
        match self {
            TransportError::Protocol(ProtocolError::Decryption)
            | TransportError::Protocol(ProtocolError::KeyExchange) => {
                TransportError::NegotiationFailed
            }
            other => other,
        }
    }
}

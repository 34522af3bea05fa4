//! Transfer-layer vocabulary: sender ↔ receiver messages.
//!
//! Same envelope shape as the rendezvous layer, but these are serialized,
//! AEAD-encrypted and sent as binary frames — the tranx server only ever sees
//! opaque bytes. Interpreted after decryption only.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::wire::Envelope;

/// A peer-to-peer message in the transfer protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMessage {
    /// An error occurred in the transfer sequence.
    Error,
    /// Receiver announces its IP to the sender via the tranx server.
    ReceiverHandshake {
        /// Receiver's address, discovered from its local socket.
        ip: IpAddr,
    },
    /// Sender announces IP, direct-transfer port and payload size.
    SenderHandshake {
        /// Sender's address, discovered from its local socket.
        ip: IpAddr,
        /// Port of the sender's direct transfer endpoint.
        port: u16,
        /// Total payload size in bytes.
        payload_size: u64,
    },
    /// Receiver reached the sender's endpoint; transfer goes direct.
    ReceiverDirectCommunication,
    /// Sender acknowledges direct communication.
    SenderDirectAck,
    /// Receiver could not reach the sender; the relay will be used.
    ReceiverRelayCommunication,
    /// Sender acknowledges relay communication.
    SenderRelayAck,
    /// Receiver requests the payload from the sender.
    ReceiverRequestPayload,
    /// Sender announces that the entire payload has been transferred.
    SenderPayloadSent,
    /// Receiver acknowledges that it has received the payload.
    ReceiverPayloadAck,
    /// Sender announces that it is closing the connection.
    SenderClosing,
    /// Receiver acknowledges the closing of the connection.
    ReceiverClosingAck,
}

#[derive(Serialize, Deserialize)]
struct ReceiverHandshakePayload {
    ip: IpAddr,
}

#[derive(Serialize, Deserialize)]
struct SenderHandshakePayload {
    ip: IpAddr,
    port: u16,
    payload_size: u64,
}

impl TransferMessage {
    /// Human-readable message name, used in protocol-violation errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Error => "TransferError",
            Self::ReceiverHandshake { .. } => "ReceiverHandshake",
            Self::SenderHandshake { .. } => "SenderHandshake",
            Self::ReceiverDirectCommunication => "ReceiverDirectCommunication",
            Self::SenderDirectAck => "SenderDirectAck",
            Self::ReceiverRelayCommunication => "ReceiverRelayCommunication",
            Self::SenderRelayAck => "SenderRelayAck",
            Self::ReceiverRequestPayload => "ReceiverRequestPayload",
            Self::SenderPayloadSent => "SenderPayloadSent",
            Self::ReceiverPayloadAck => "ReceiverPayloadAck",
            Self::SenderClosing => "SenderClosing",
            Self::ReceiverClosingAck => "ReceiverClosingAck",
        }
    }

    /// Serialize to the `{"type": N, "payload": ...}` JSON form.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let envelope = match self {
            Self::Error => Envelope::new(0),
            Self::ReceiverHandshake { ip } => {
                Envelope::with_payload(1, &ReceiverHandshakePayload { ip: *ip })?
            }
            Self::SenderHandshake {
                ip,
                port,
                payload_size,
            } => Envelope::with_payload(
                2,
                &SenderHandshakePayload {
                    ip: *ip,
                    port: *port,
                    payload_size: *payload_size,
                },
            )?,
            Self::ReceiverDirectCommunication => Envelope::new(3),
            Self::SenderDirectAck => Envelope::new(4),
            Self::ReceiverRelayCommunication => Envelope::new(5),
            Self::SenderRelayAck => Envelope::new(6),
            Self::ReceiverRequestPayload => Envelope::new(7),
            Self::SenderPayloadSent => Envelope::new(8),
            Self::ReceiverPayloadAck => Envelope::new(9),
            Self::SenderClosing => Envelope::new(10),
            Self::ReceiverClosingAck => Envelope::new(11),
        };

        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parse from decrypted frame bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;

        Ok(match envelope.kind {
            0 => Self::Error,
            1 => {
                let p: ReceiverHandshakePayload = envelope.take_payload("ReceiverHandshake")?;
                Self::ReceiverHandshake { ip: p.ip }
            }
            2 => {
                let p: SenderHandshakePayload = envelope.take_payload("SenderHandshake")?;
                Self::SenderHandshake {
                    ip: p.ip,
                    port: p.port,
                    payload_size: p.payload_size,
                }
            }
            3 => Self::ReceiverDirectCommunication,
            4 => Self::SenderDirectAck,
            5 => Self::ReceiverRelayCommunication,
            6 => Self::SenderRelayAck,
            7 => Self::ReceiverRequestPayload,
            8 => Self::SenderPayloadSent,
            9 => Self::ReceiverPayloadAck,
            10 => Self::SenderClosing,
            11 => Self::ReceiverClosingAck,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }

    /// Error for receiving `self` where one of `expected` was required.
    pub fn unexpected(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::UnexpectedMessageType {
            expected,
            got: self.name(),
        }
    }
}

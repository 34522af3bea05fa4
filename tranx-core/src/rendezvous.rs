//! Rendezvous-layer vocabulary: sender/receiver ↔ tranx control messages.
//!
//! These travel as cleartext JSON text frames. They only ever carry public
//! PAKE material, salts and hashed passwords — never the password itself.
//! Type tags are fixed; reordering them breaks the wire format.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::wire::{base64_bytes, Envelope};

/// A control-plane message exchanged with the tranx server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendezvousMessage {
    /// An ID for this connection is bound and communicated to the sender.
    TranxToSenderBind {
        /// The pending-sender ID, later the numeric password prefix.
        id: u64,
    },
    /// Sender has generated and hashed the password.
    SenderToTranxEstablish {
        /// Hex-encoded SHA-256 of the password; the mailbox key.
        password: String,
    },
    /// The password has reached the receiver, who hashed it the same way.
    ReceiverToTranxEstablish {
        /// Hex-encoded SHA-256 of the password; the mailbox lookup key.
        password: String,
    },
    /// Tranx announces to the sender that a receiver is connected.
    TranxToSenderReady,
    /// Sender's public PAKE material, to be forwarded.
    SenderToTranxPake {
        /// Opaque PAKE bytes.
        bytes: Vec<u8>,
    },
    /// Tranx forwards the sender's PAKE material to the receiver.
    TranxToReceiverPake {
        /// Opaque PAKE bytes.
        bytes: Vec<u8>,
    },
    /// Receiver's public PAKE material, to be forwarded.
    ReceiverToTranxPake {
        /// Opaque PAKE bytes.
        bytes: Vec<u8>,
    },
    /// Tranx forwards the receiver's PAKE material to the sender.
    TranxToSenderPake {
        /// Opaque PAKE bytes.
        bytes: Vec<u8>,
    },
    /// Sender's cryptographic salt, to be forwarded.
    SenderToTranxSalt {
        /// Key-derivation salt generated by the sender.
        salt: Vec<u8>,
    },
    /// Tranx forwards the salt to the receiver.
    TranxToReceiverSalt {
        /// Key-derivation salt generated by the sender.
        salt: Vec<u8>,
    },
    /// Receiver reaches the sender directly; tranx can tear the relay down.
    ReceiverToTranxClose,
    /// Transfer sequence completed; tranx can tear the relay down.
    SenderToTranxClose,
}

#[derive(Serialize, Deserialize)]
struct BindPayload {
    id: u64,
}

#[derive(Serialize, Deserialize)]
struct PasswordPayload {
    password: String,
}

#[derive(Serialize, Deserialize)]
struct PakePayload {
    #[serde(with = "base64_bytes")]
    pake_bytes: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SaltPayload {
    #[serde(with = "base64_bytes")]
    salt: Vec<u8>,
}

impl RendezvousMessage {
    /// Human-readable message name, used in protocol-violation errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TranxToSenderBind { .. } => "TranxToSenderBind",
            Self::SenderToTranxEstablish { .. } => "SenderToTranxEstablish",
            Self::ReceiverToTranxEstablish { .. } => "ReceiverToTranxEstablish",
            Self::TranxToSenderReady => "TranxToSenderReady",
            Self::SenderToTranxPake { .. } => "SenderToTranxPake",
            Self::TranxToReceiverPake { .. } => "TranxToReceiverPake",
            Self::ReceiverToTranxPake { .. } => "ReceiverToTranxPake",
            Self::TranxToSenderPake { .. } => "TranxToSenderPake",
            Self::SenderToTranxSalt { .. } => "SenderToTranxSalt",
            Self::TranxToReceiverSalt { .. } => "TranxToReceiverSalt",
            Self::ReceiverToTranxClose => "ReceiverToTranxClose",
            Self::SenderToTranxClose => "SenderToTranxClose",
        }
    }

    /// Error for receiving `self` where `expected` was required.
    pub fn unexpected(&self, expected: &'static str) -> ProtocolError {
        ProtocolError::UnexpectedMessageType {
            expected,
            got: self.name(),
        }
    }

    /// Serialize to the `{"type": N, "payload": ...}` JSON form.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let envelope = match self {
            Self::TranxToSenderBind { id } => Envelope::with_payload(0, &BindPayload { id: *id })?,
            Self::SenderToTranxEstablish { password } => Envelope::with_payload(
                1,
                &PasswordPayload {
                    password: password.clone(),
                },
            )?,
            Self::ReceiverToTranxEstablish { password } => Envelope::with_payload(
                2,
                &PasswordPayload {
                    password: password.clone(),
                },
            )?,
            Self::TranxToSenderReady => Envelope::new(3),
            Self::SenderToTranxPake { bytes } => Envelope::with_payload(
                4,
                &PakePayload {
                    pake_bytes: bytes.clone(),
                },
            )?,
            Self::TranxToReceiverPake { bytes } => Envelope::with_payload(
                5,
                &PakePayload {
                    pake_bytes: bytes.clone(),
                },
            )?,
            Self::ReceiverToTranxPake { bytes } => Envelope::with_payload(
                6,
                &PakePayload {
                    pake_bytes: bytes.clone(),
                },
            )?,
            Self::TranxToSenderPake { bytes } => Envelope::with_payload(
                7,
                &PakePayload {
                    pake_bytes: bytes.clone(),
                },
            )?,
            Self::SenderToTranxSalt { salt } => {
                Envelope::with_payload(8, &SaltPayload { salt: salt.clone() })?
            }
            Self::TranxToReceiverSalt { salt } => {
                Envelope::with_payload(9, &SaltPayload { salt: salt.clone() })?
            }
            Self::ReceiverToTranxClose => Envelope::new(10),
            Self::SenderToTranxClose => Envelope::new(11),
        };

        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parse from raw frame bytes. Unknown tags and malformed payloads are
    /// hard errors.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;

        Ok(match envelope.kind {
            0 => {
                let p: BindPayload = envelope.take_payload("TranxToSenderBind")?;
                Self::TranxToSenderBind { id: p.id }
            }
            1 => {
                let p: PasswordPayload = envelope.take_payload("SenderToTranxEstablish")?;
                Self::SenderToTranxEstablish {
                    password: p.password,
                }
            }
            2 => {
                let p: PasswordPayload = envelope.take_payload("ReceiverToTranxEstablish")?;
                Self::ReceiverToTranxEstablish {
                    password: p.password,
                }
            }
            3 => Self::TranxToSenderReady,
            4 => {
                let p: PakePayload = envelope.take_payload("SenderToTranxPake")?;
                Self::SenderToTranxPake {
                    bytes: p.pake_bytes,
                }
            }
            5 => {
                let p: PakePayload = envelope.take_payload("TranxToReceiverPake")?;
                Self::TranxToReceiverPake {
                    bytes: p.pake_bytes,
                }
            }
            6 => {
                let p: PakePayload = envelope.take_payload("ReceiverToTranxPake")?;
                Self::ReceiverToTranxPake {
                    bytes: p.pake_bytes,
                }
            }
            7 => {
                let p: PakePayload = envelope.take_payload("TranxToSenderPake")?;
                Self::TranxToSenderPake {
                    bytes: p.pake_bytes,
                }
            }
            8 => {
                let p: SaltPayload = envelope.take_payload("SenderToTranxSalt")?;
                Self::SenderToTranxSalt { salt: p.salt }
            }
            9 => {
                let p: SaltPayload = envelope.take_payload("TranxToReceiverSalt")?;
                Self::TranxToReceiverSalt { salt: p.salt }
            }
            10 => Self::ReceiverToTranxClose,
            11 => Self::SenderToTranxClose,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_wire_shape_is_stable() {
        let msg = RendezvousMessage::TranxToSenderBind { id: 42 };
        assert_eq!(msg.to_json().unwrap(), r#"{"type":0,"payload":{"id":42}}"#);
    }

    #[test]
    fn empty_payload_messages_omit_payload_field() {
        let msg = RendezvousMessage::TranxToSenderReady;
        assert_eq!(msg.to_json().unwrap(), r#"{"type":3}"#);

        let msg = RendezvousMessage::ReceiverToTranxClose;
        assert_eq!(msg.to_json().unwrap(), r#"{"type":10}"#);
    }

    #[test]
    fn pake_bytes_encode_as_base64() {
        let msg = RendezvousMessage::SenderToTranxPake {
            bytes: vec![0x00, 0x01, 0x02],
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""pake_bytes":"AAEC""#), "got: {json}");

        let parsed = RendezvousMessage::from_slice(json.as_bytes()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn all_variants_roundtrip() {
        let messages = vec![
            RendezvousMessage::TranxToSenderBind { id: 7 },
            RendezvousMessage::SenderToTranxEstablish {
                password: "ab".into(),
            },
            RendezvousMessage::ReceiverToTranxEstablish {
                password: "cd".into(),
            },
            RendezvousMessage::TranxToSenderReady,
            RendezvousMessage::SenderToTranxPake { bytes: vec![1] },
            RendezvousMessage::TranxToReceiverPake { bytes: vec![2] },
            RendezvousMessage::ReceiverToTranxPake { bytes: vec![3] },
            RendezvousMessage::TranxToSenderPake { bytes: vec![4] },
            RendezvousMessage::SenderToTranxSalt { salt: vec![5] },
            RendezvousMessage::TranxToReceiverSalt { salt: vec![6] },
            RendezvousMessage::ReceiverToTranxClose,
            RendezvousMessage::SenderToTranxClose,
        ];

        for msg in messages {
            let json = msg.to_json().unwrap();
            let parsed = RendezvousMessage::from_slice(json.as_bytes()).unwrap();
            assert_eq!(parsed, msg);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = RendezvousMessage::from_slice(br#"{"type":99}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownMessageType(99)));
    }

    #[test]
    fn missing_required_payload_is_rejected() {
        let err = RendezvousMessage::from_slice(br#"{"type":4}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingPayload(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(RendezvousMessage::from_slice(b"\x00\x01binary").is_err());
        assert!(RendezvousMessage::from_slice(b"{}").is_err());
    }
}

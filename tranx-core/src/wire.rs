//! JSON envelope shared by both message vocabularies.
//!
//! Wire shape:
//! ```text
//! {"type": <int>, "payload": <type-specific object, absent when empty>}
//! ```
//!
//! Byte fields inside payloads encode as base64 strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The untyped half of a message: integer tag plus raw payload.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "type")]
    pub kind: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    pub fn new(kind: i64) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    pub fn with_payload<P: Serialize>(kind: i64, payload: &P) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind,
            payload: Some(serde_json::to_value(payload)?),
        })
    }

    /// Deserialize the payload, failing when the message type requires one
    /// and none was present.
    pub fn take_payload<P: DeserializeOwned>(self, name: &'static str) -> Result<P, ProtocolError> {
        let value = self.payload.ok_or(ProtocolError::MissingPayload(name))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// serde codec for byte fields carried as base64 strings.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(de)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

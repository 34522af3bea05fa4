//! Protocol errors.
//!
//! The handshake depends on strict message ordering, so none of these are
//! recoverable: the connection that produced one is dropped.

use thiserror::Error;

/// Errors produced by the protocol leaf types.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message arrived with a type tag that is not part of the vocabulary.
    #[error("unknown message type tag: {0}")]
    UnknownMessageType(i64),

    /// A message of the wrong type arrived at a given handshake step.
    #[error("wrong message type, expected: ({expected}), got: ({got})")]
    UnexpectedMessageType {
        /// Name(s) of the type(s) the current step allows.
        expected: &'static str,
        /// Name of the type that actually arrived.
        got: &'static str,
    },

    /// The envelope or its payload did not deserialize.
    #[error("malformed message payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// A payload object was missing where the message type requires one.
    #[error("missing payload for message type {0}")]
    MissingPayload(&'static str),

    /// AEAD authentication failed or the ciphertext was malformed.
    #[error("decryption failed")]
    Decryption,

    /// AEAD encryption failed.
    #[error("encryption failed")]
    Encryption,

    /// The PAKE exchange could not complete (peer bytes rejected).
    #[error("key exchange failed")]
    KeyExchange,

    /// A password string did not match the `<id>-<word>-<word>-<word>` grammar.
    #[error("password {0:?} is on wrong format")]
    PasswordFormat(String),

    /// Payload exceeds MAX_CHUNK_BYTES * MAX_SEND_CHUNKS.
    #[error("payload of {0} bytes exceeds the maximum transferable size")]
    PayloadTooLarge(u64),
}

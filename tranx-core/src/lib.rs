//! tranx protocol core.
//!
//! Leaf crate shared by the tranx server and the sender/receiver clients:
//!
//! - The two message vocabularies: cleartext rendezvous control messages and
//!   encrypted transfer messages, both `{"type": N, "payload": ...}` JSON
//! - The `<id>-<word>-<word>-<word>` password scheme
//! - The PAKE wrapper and the salt-keyed AEAD session crypt
//!
//! No I/O lives here. Every protocol violation is a hard error: the
//! handshake's security properties depend on strict message ordering, so
//! nothing in this crate retries or recovers.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod crypt;
pub mod error;
pub mod pake;
pub mod password;
pub mod rendezvous;
pub mod transfer;
mod wire;

pub use crypt::Crypt;
pub use error::ProtocolError;
pub use pake::{KeyExchange, SessionKey};
pub use password::Password;
pub use rendezvous::RendezvousMessage;
pub use transfer::TransferMessage;

/// Default port of a public tranx server.
pub const DEFAULT_TRANX_PORT: u16 = 80;

/// How long a bound sender waits for a receiver before the session fails.
pub const RECEIVER_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Payload chunk size for the transfer executor.
pub const MAX_CHUNK_BYTES: usize = 1_000_000;

/// Maximum number of chunks; together with [`MAX_CHUNK_BYTES`] this bounds
/// the payload size.
pub const MAX_SEND_CHUNKS: u64 = 200_000_000;

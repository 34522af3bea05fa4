//! Client-side transport for tranx transfers.
//!
//! [`Sender`] establishes a mailbox and obtains the transfer password;
//! [`Receiver`] joins with that password. After the PAKE handshake the
//! receiver probes the sender for a direct connection and falls back to
//! the relay, and the payload moves over whichever route won.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod error;
mod receiver;
mod sender;
mod server;
mod stream;
mod transfer;

pub use config::ClientConfig;
pub use error::TransportError;
pub use receiver::Receiver;
pub use sender::Sender;
pub use transfer::{Payload, Progress, ProgressSender, TransferState};

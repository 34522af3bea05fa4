//! Password-authenticated key exchange.
//!
//! Wraps `spake2` in symmetric mode: both peers start from the raw password,
//! exchange one public message each through the tranx relay, and finish with
//! the same session key — without the password ever crossing the wire. A
//! wrong password on either side makes `finish` fail or the keys diverge,
//! after which every AEAD operation fails closed.

use spake2::{Ed25519Group, Identity, Password as PakePassword, Spake2};
use zeroize::Zeroizing;

use crate::error::ProtocolError;
use crate::password::Password;

/// Shared identity binding the exchange to this protocol.
const PAKE_IDENTITY: &[u8] = b"tranx-session";

/// An in-progress key exchange. Consumed by [`KeyExchange::finish`].
pub struct KeyExchange {
    state: Spake2<Ed25519Group>,
}

/// The session key both peers derive from a completed exchange.
///
/// Zeroized on drop; feed it to [`crate::crypt::Crypt::new`] together with a
/// salt to obtain the actual encryption key.
pub struct SessionKey(Zeroizing<Vec<u8>>);

impl KeyExchange {
    /// Begin an exchange. Returns the state and the public bytes to send to
    /// the peer via the tranx server.
    ///
    /// Curve initialization is CPU-heavy relative to the rest of the
    /// handshake; callers that must not stall a socket read run this on a
    /// background task.
    pub fn start(password: &Password) -> (Self, Vec<u8>) {
        let (state, outbound) = Spake2::<Ed25519Group>::start_symmetric(
            &PakePassword::new(password.as_str().as_bytes()),
            &Identity::new(PAKE_IDENTITY),
        );
        (Self { state }, outbound)
    }

    /// Complete the exchange with the peer's public bytes.
    pub fn finish(self, peer_bytes: &[u8]) -> Result<SessionKey, ProtocolError> {
        let key = self
            .state
            .finish(peer_bytes)
            .map_err(|_| ProtocolError::KeyExchange)?;
        Ok(SessionKey(Zeroizing::new(key)))
    }
}

impl SessionKey {
    /// Raw key material, input to the key-derivation step.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_agrees_on_key() {
        let password = Password::parse("3-lotus-ember-flint").unwrap();

        let (sender, sender_bytes) = KeyExchange::start(&password);
        let (receiver, receiver_bytes) = KeyExchange::start(&password);

        let sender_key = sender.finish(&receiver_bytes).unwrap();
        let receiver_key = receiver.finish(&sender_bytes).unwrap();

        assert_eq!(sender_key.as_bytes(), receiver_key.as_bytes());
        assert!(!sender_key.as_bytes().is_empty());
    }

    #[test]
    fn different_passwords_disagree() {
        let good = Password::parse("3-lotus-ember-flint").unwrap();
        let wrong = Password::parse("3-lotus-ember-frost").unwrap();

        let (sender, sender_bytes) = KeyExchange::start(&good);
        let (receiver, receiver_bytes) = KeyExchange::start(&wrong);

        // spake2 cannot detect the mismatch itself; the keys simply differ
        // and authenticated decryption fails downstream.
        let sender_key = sender.finish(&receiver_bytes).unwrap();
        let receiver_key = receiver.finish(&sender_bytes).unwrap();
        assert_ne!(sender_key.as_bytes(), receiver_key.as_bytes());
    }

    #[test]
    fn corrupted_peer_bytes_fail() {
        let password = Password::parse("3-lotus-ember-flint").unwrap();
        let (sender, _) = KeyExchange::start(&password);
        assert!(matches!(
            sender.finish(b"not a valid pake message"),
            Err(ProtocolError::KeyExchange)
        ));
    }
}

//! Authenticated encryption for the transfer session.
//!
//! Turns the PAKE session key plus a salt into a ChaCha20-Poly1305 key via
//! HKDF-SHA256. Whichever side constructs its `Crypt` first (the sender)
//! generates the salt and ships it through the tranx server; the receiver
//! constructs with that salt and both end up with byte-identical keys.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::ProtocolError;
use crate::pake::SessionKey;

/// Derived symmetric key length.
const KEY_SIZE: usize = 32;

/// Salt length generated when none is supplied.
pub const SALT_SIZE: usize = 32;

/// AEAD nonce length; a fresh random nonce is prepended to every ciphertext.
const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag length.
const TAG_SIZE: usize = 16;

/// HKDF domain-separation info.
const KDF_INFO: &[u8] = b"tranx-transfer-encryption";

/// A session-scoped authenticated-encryption capability.
pub struct Crypt {
    cipher: ChaCha20Poly1305,
    salt: Vec<u8>,
}

impl Crypt {
    /// Derive the encryption key from `session_key` and `salt`. A random salt
    /// is generated when none is given.
    pub fn new(session_key: &SessionKey, salt: Option<Vec<u8>>) -> Result<Self, ProtocolError> {
        let salt = salt.unwrap_or_else(|| {
            let mut bytes = vec![0u8; SALT_SIZE];
            OsRng.fill_bytes(&mut bytes);
            bytes
        });

        let hkdf = Hkdf::<Sha256>::new(Some(&salt), session_key.as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        hkdf.expand(KDF_INFO, key.as_mut())
            .map_err(|_| ProtocolError::KeyExchange)?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
        Ok(Self { cipher, salt })
    }

    /// The salt this crypt was derived with, for the SenderToTranxSalt
    /// message.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Encrypt with a fresh random nonce, prepended to the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| ProtocolError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt `nonce || ciphertext`. Fails closed on short input or
    /// authentication-tag mismatch.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ProtocolError::Decryption);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProtocolError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pake::KeyExchange;
    use crate::password::Password;

    fn session_keys() -> (SessionKey, SessionKey) {
        let password = Password::parse("8-cedar-onyx-reef").unwrap();
        let (a, a_bytes) = KeyExchange::start(&password);
        let (b, b_bytes) = KeyExchange::start(&password);
        (a.finish(&b_bytes).unwrap(), b.finish(&a_bytes).unwrap())
    }

    #[test]
    fn encrypt_decrypt_roundtrip_across_peers() {
        let (sender_key, receiver_key) = session_keys();

        let sender = Crypt::new(&sender_key, None).unwrap();
        let receiver = Crypt::new(&receiver_key, Some(sender.salt().to_vec())).unwrap();

        let ciphertext = sender.encrypt(b"hello world").unwrap();
        assert_eq!(receiver.decrypt(&ciphertext).unwrap(), b"hello world");

        let reply = receiver.encrypt(b"hello back").unwrap();
        assert_eq!(sender.decrypt(&reply).unwrap(), b"hello back");
    }

    #[test]
    fn nonces_are_fresh_per_call() {
        let (key, _) = session_keys();
        let crypt = Crypt::new(&key, None).unwrap();

        let a = crypt.encrypt(b"same plaintext").unwrap();
        let b = crypt.encrypt(b"same plaintext").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let (key, _) = session_keys();
        let crypt = Crypt::new(&key, None).unwrap();

        let mut ciphertext = crypt.encrypt(b"secret").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        assert!(matches!(
            crypt.decrypt(&ciphertext),
            Err(ProtocolError::Decryption)
        ));
    }

    #[test]
    fn short_input_is_rejected_not_panicked() {
        let (key, _) = session_keys();
        let crypt = Crypt::new(&key, None).unwrap();

        for input in [&b""[..], &[0u8; 5], &[0u8; NONCE_SIZE + TAG_SIZE - 1]] {
            assert!(matches!(
                crypt.decrypt(input),
                Err(ProtocolError::Decryption)
            ));
        }
    }

    #[test]
    fn different_salts_yield_different_keys() {
        let (key, _) = session_keys();

        let a = Crypt::new(&key, Some(vec![1u8; SALT_SIZE])).unwrap();
        let b = Crypt::new(&key, Some(vec![2u8; SALT_SIZE])).unwrap();

        let ciphertext = a.encrypt(b"payload").unwrap();
        assert!(b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn mismatched_session_keys_fail_closed() {
        let good = Password::parse("8-cedar-onyx-reef").unwrap();
        let wrong = Password::parse("8-cedar-onyx-kelp").unwrap();

        let (a, a_bytes) = KeyExchange::start(&good);
        let (b, b_bytes) = KeyExchange::start(&wrong);
        let sender_key = a.finish(&b_bytes).unwrap();
        let receiver_key = b.finish(&a_bytes).unwrap();

        let sender = Crypt::new(&sender_key, None).unwrap();
        let receiver = Crypt::new(&receiver_key, Some(sender.salt().to_vec())).unwrap();

        let ciphertext = sender.encrypt(b"never arrives").unwrap();
        assert!(matches!(
            receiver.decrypt(&ciphertext),
            Err(ProtocolError::Decryption)
        ));
    }
}

//! Transfer passwords.
//!
//! A password is `<id>-<word>-<word>-<word>`: the numeric pending-sender ID
//! assigned by the tranx server, followed by three distinct words from the
//! word list. The receiver types it verbatim; both sides hash it for the
//! mailbox key, and the raw value feeds the PAKE — it never crosses the wire.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;

/// Number of words following the numeric prefix.
const PASSWORD_WORDS: usize = 3;

/// Word list the password words are drawn from. All lowercase ASCII so the
/// parse grammar stays trivial to type and verify.
const WORD_LIST: &[&str] = &[
    "acorn", "alloy", "amber", "anchor", "apple", "arrow", "aspen", "atlas", "badge", "bamboo",
    "basil", "beacon", "berry", "birch", "bison", "blaze", "bloom", "bolt", "breeze", "brook",
    "cabin", "cactus", "candle", "canyon", "cedar", "chalk", "cherry", "cliff", "clover", "cobalt",
    "comet", "coral", "cove", "crane", "creek", "crystal", "daisy", "dawn", "delta", "drift",
    "dune", "eagle", "echo", "ember", "fable", "falcon", "fern", "field", "fjord", "flint",
    "forest", "fox", "frost", "garnet", "geyser", "glade", "grove", "harbor", "hazel", "heron",
    "hollow", "ivory", "jade", "juniper", "kelp", "lagoon", "lark", "lava", "lichen", "lily",
    "linen", "lotus", "lunar", "maple", "marble", "meadow", "mesa", "mist", "moss", "nectar",
    "north", "oak", "ocean", "olive", "onyx", "opal", "orchid", "osprey", "otter", "pebble",
    "pine", "plume", "pond", "poppy", "prairie", "quartz", "raven", "reef", "ridge", "river",
    "robin", "rowan", "sage", "salmon", "shale", "sierra", "slate", "spruce", "stone", "storm",
    "summit", "sun", "swift", "thistle", "tide", "timber", "topaz", "trout", "tulip", "tundra",
    "valley", "violet", "wave", "willow", "wren", "yarrow", "zephyr", "zinc",
];

/// A parsed or generated transfer password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Generate a random password prefixed with the supplied pending-sender ID.
    pub fn generate(id: u64) -> Self {
        let mut rng = rand::thread_rng();
        let mut words: Vec<&str> = Vec::with_capacity(PASSWORD_WORDS);

        // three unique words
        while words.len() != PASSWORD_WORDS {
            let candidate = WORD_LIST[rng.gen_range(0..WORD_LIST.len())];
            if !words.contains(&candidate) {
                words.push(candidate);
            }
        }

        Self(format!("{}-{}-{}-{}", id, words[0], words[1], words[2]))
    }

    /// Parse a password typed by the receiver, enforcing the fixed grammar:
    /// digits, hyphen, three lowercase-letter tokens, hyphen-separated.
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let reject = || ProtocolError::PasswordFormat(input.to_string());

        let segments: Vec<&str> = input.split('-').collect();
        if segments.len() != 1 + PASSWORD_WORDS {
            return Err(reject());
        }

        let id = segments[0];
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(reject());
        }

        for word in &segments[1..] {
            if word.is_empty() || !word.bytes().all(|b| b.is_ascii_lowercase()) {
                return Err(reject());
            }
        }

        Ok(Self(input.to_string()))
    }

    /// Hex-encoded SHA-256 of the password: the mailbox key communicated to
    /// the tranx server in place of the password itself.
    pub fn hashed(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The raw password string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_passwords_parse_back() {
        for id in [0, 1, 9, 42, 100_000] {
            let password = Password::generate(id);
            let parsed = Password::parse(password.as_str()).unwrap();
            assert_eq!(parsed, password);
            assert!(password.as_str().starts_with(&format!("{id}-")));
        }
    }

    #[test]
    fn generated_words_are_distinct() {
        for _ in 0..50 {
            let password = Password::generate(1);
            let words: Vec<&str> = password.as_str().split('-').skip(1).collect();
            assert_eq!(words.len(), 3);
            assert_ne!(words[0], words[1]);
            assert_ne!(words[0], words[2]);
            assert_ne!(words[1], words[2]);
        }
    }

    #[test]
    fn malformed_passwords_are_rejected() {
        let bad = [
            "",
            "1-word-word",            // too few segments
            "1-a-b-c-d",              // too many segments
            "x-apple-berry-cedar",    // non-numeric prefix
            "1-Apple-berry-cedar",    // uppercase letter
            "1-apple-ber2y-cedar",    // digit inside word
            "-apple-berry-cedar",     // empty prefix
            "1--berry-cedar",         // empty word
            "1-apple-berry-cedar ",   // trailing space
        ];
        for input in bad {
            assert!(Password::parse(input).is_err(), "accepted: {input:?}");
        }
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        let password = Password::parse("1-apple-berry-cedar").unwrap();
        let hash = password.hashed();
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, password.hashed());
        assert!(hash.bytes().all(|b| b.is_ascii_hexdigit()));

        let other = Password::parse("1-apple-berry-cove").unwrap();
        assert_ne!(hash, other.hashed());
    }
}

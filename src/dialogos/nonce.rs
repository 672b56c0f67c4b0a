//! Cryptographically random reference tokens used as dialogue reference
//! halves.

use rand::RngCore;

/// Number of random bytes per generated nonce (256 bits).
const NONCE_BYTES: usize = 32;

/// Generates a fresh, lowercase-hex-encoded 32-byte nonce.
///
/// Backed by the OS entropy source (`rand::rngs::OsRng`), the same pairing of
/// `rand`/`hex` the pack reaches for wherever it needs an unguessable token.
/// Collisions are not checked for here — callers operating a long-lived
/// engine may treat one as fatal.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_64_lowercase_hex_characters() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_BYTES * 2);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn successive_calls_differ() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_ne!(a, b);
    }
}

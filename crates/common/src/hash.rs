//! SHA-256 helpers with deterministic lowercase-hex output.

use sha2::{Digest, Sha256};

/// Compute SHA-256 and return the lowercase hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Short prefix form useful for logging (first 12 hex chars).
pub fn short_hash(data: &[u8]) -> String {
    let h = sha256_hex(data);
    h.get(0..12).unwrap_or(&h).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let h1 = sha256_hex(b"some payload bytes");
        let h2 = sha256_hex(b"some payload bytes");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_known_vector() {
        // SHA-256("") is a fixed constant.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash(b"x").len(), 12);
    }
}

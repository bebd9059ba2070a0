//! SHA-256 helpers shared by leaf aggregation and entropy derivation

use sha2::{Digest, Sha256};

/// SHA-256 over the concatenation of `parts`
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenation_is_split_independent() {
        let whole = sha256_concat(&[b"abcdef"]);
        let split = sha256_concat(&[b"ab", b"cd", b"ef"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_known_vector() {
        // SHA-256("abc")
        let expected = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(sha256_concat(&[b"abc"]), expected);
    }
}

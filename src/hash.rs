//! The digest used by `Echo`, `Ready` and `Answer` verification.

use tiny_keccak::{Hasher, Sha3};

/// Length of a `Digest` in bytes.
pub const DIGEST_LEN: usize = 32;

/// A fixed-size payload digest.
pub type Digest = [u8; DIGEST_LEN];

/// Returns the SHA3-256 hash of the value's `[u8]` representation.
pub fn hash<T: AsRef<[u8]>>(value: T) -> Digest {
    let mut sha3 = Sha3::v256();
    sha3.update(value.as_ref());

    let mut out = [0u8; DIGEST_LEN];
    sha3.finalize(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::hash;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash(b"hello"), hash(b"hello".to_vec()));
        assert_ne!(hash(b"hello"), hash(b"hellO"));
        assert_ne!(hash(b""), [0u8; 32]);
    }
}

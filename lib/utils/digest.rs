//! Streaming SHA-256 digest computation, used by the local store so a blob's hash is never
//! computed by fully buffering its content.

use sha2::{Digest as _, Sha256};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Accumulates a SHA-256 hash incrementally as bytes are written to the store.
#[derive(Default)]
pub struct StreamingDigest {
    hasher: Sha256,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StreamingDigest {
    /// Creates a fresh, empty digest accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `chunk` into the running hash.
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finalizes the hash and formats it as `sha256:<64-hex>`.
    pub fn finalize_to_digest_string(self) -> String {
        format!("sha256:{}", hex::encode(self.hasher.finalize()))
    }
}

/// Computes `sha256:<64-hex>` over a complete byte slice.
///
/// Used only for small, already-in-memory payloads (manifests, configs); blob content always
/// goes through [`StreamingDigest`] instead.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Extracts the bare hex component from a `sha256:<hex>` digest string, if well-formed.
pub fn hex_of_digest(digest: &str) -> Option<&str> {
    digest.strip_prefix("sha256:").filter(|hex| {
        hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_bytes_matches_streaming_digest() {
        let data = b"hello world";
        let one_shot = digest_bytes(data);

        let mut streaming = StreamingDigest::new();
        streaming.update(&data[..5]);
        streaming.update(&data[5..]);
        let streamed = streaming.finalize_to_digest_string();

        assert_eq!(one_shot, streamed);
    }

    #[test]
    fn test_digest_bytes_known_vector() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            digest_bytes(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hex_of_digest_rejects_malformed() {
        assert!(hex_of_digest("sha256:abc").is_none());
        assert!(hex_of_digest("md5:abc").is_none());
        assert!(hex_of_digest(&digest_bytes(b"x")).is_some());
    }
}

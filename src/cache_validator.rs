use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

/// Serialized cache payload guarded by a SHA-256 checksum.
///
/// Prioritization results are cached as JSON. On read the checksum is
/// recomputed; a mismatch or an undecodable payload is treated as a miss so
/// the caller recomputes from the datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCacheEntry {
    /// The cached payload (JSON string).
    pub data: String,
    /// SHA-256 checksum of `data` (hex encoded).
    pub checksum: String,
}

impl ValidatedCacheEntry {
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    /// Serializes `value` and seals it with its checksum.
    pub fn seal<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(value)?))
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    /// Returns the decoded payload, or `None` if the entry is corrupt.
    pub fn open<T: DeserializeOwned>(&self) -> Option<T> {
        if !self.is_valid() {
            tracing::warn!(
                "Cache validation failed: checksum mismatch. Expected: {}, Data length: {}",
                self.checksum,
                self.data.len()
            );
            return None;
        }

        match serde_json::from_str(&self.data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Cached payload could not be decoded: {}", e);
                None
            }
        }
    }
}

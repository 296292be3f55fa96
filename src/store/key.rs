//! Blob file naming using SHA-256 hashes

use sha2::{Digest, Sha256};

/// Deterministic blob file name for a (namespace, key) pair.
///
/// Cache keys are full URIs, so they cannot be used as file names directly.
pub fn blob_name(namespace: &str, key: &str) -> String {
    let mut hasher = Sha256::new();

    hasher.update(namespace.as_bytes());
    hasher.update(b"|");
    hasher.update(key.as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Relative blob path, sharded by the first two hex characters
pub fn blob_path(namespace: &str, key: &str) -> String {
    let name = blob_name(namespace, key);
    format!("{}/{}.bin", &name[..2], name)
}

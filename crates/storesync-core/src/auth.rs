use sha2::{Digest, Sha256};

/// Salted hash of a tenant API key, as stored in the control plane.
///
/// The raw key never touches the database; resolution hashes the presented
/// header value with the deployment salt and matches on the digest.
#[must_use]
pub fn hash_api_key(api_key: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(api_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

//! Cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// The key is derived from the uppercased method and the already
/// canonicalized URL, so `get https://a/` and `GET https://a/` collide.
pub fn compute_cache_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b" ");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

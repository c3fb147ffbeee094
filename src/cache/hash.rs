use sha2::{Digest, Sha256};

/// Number of hex characters kept from the fragment digest.
pub const FINGERPRINT_LEN: usize = 16;

pub fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Dedup key for a narrative fragment: case and surrounding whitespace are ignored.
pub fn fragment_fingerprint(text: &str) -> String {
    let normalized = text.trim().to_lowercase();
    let mut hash = compute_hash(&normalized);
    hash.truncate(FINGERPRINT_LEN);
    hash
}

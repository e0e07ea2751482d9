use sha2::{Digest, Sha256};

// =============================================================================
// Identifier Pepper (keeps raw IPs and emails out of the counting store)
// =============================================================================

/// Apply a server-side pepper to a caller identifier
///
/// Identifiers are often personal data (email addresses, client IPs). With a
/// pepper configured the store only ever sees this digest.
///
/// # Algorithm
/// `hashed = SHA256(identifier + pepper)`, hex encoded
pub fn pepper_identifier(identifier: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

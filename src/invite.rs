//! Staff invite tokens: 64 lowercase hex characters, unguessable, checked
//! for shape before any database lookup.

use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn generate_token() -> String {
    let mut hasher = Sha256::new();
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    hasher.update(nanos.to_le_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn validate_token(token: &str) -> bool {
    token.len() == 64
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_validate_and_differ() {
        let a = generate_token();
        let b = generate_token();
        assert!(validate_token(&a));
        assert!(validate_token(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(!validate_token(""));
        assert!(!validate_token("abc123"));
        assert!(!validate_token(&"A".repeat(64)));
        assert!(!validate_token(&"g".repeat(64)));
    }
}

//! Cache key derivation
//!
//! Lookup parameters are normalized (trimmed, whitespace collapsed,
//! case-folded, fields sorted by name) and hashed with SHA-256, so two
//! logically identical lookups written differently land on the same entry.
//! The collaborator namespace prefixes the digest, which keeps adapters that
//! share one store in disjoint key spaces.

use sha2::{Digest, Sha256};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    digest: String,
}

impl CacheKey {
    /// Key for a free-text query
    pub fn from_query(namespace: &str, query: &str) -> Self {
        Self::from_normalized(namespace, &normalize_text(query))
    }

    /// Key for an entity identifier (username, patent number, ...)
    pub fn from_entity(namespace: &str, id: &str) -> Self {
        Self::from_normalized(namespace, &normalize_text(id))
    }

    /// Key for a set of named parameters; field order does not matter
    pub fn from_params(namespace: &str, params: &[(&str, &str)]) -> Self {
        let mut fields: Vec<(String, String)> = params
            .iter()
            .map(|(name, value)| (normalize_text(name), normalize_text(value)))
            .collect();
        fields.sort();

        let joined = fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("&");
        Self::from_normalized(namespace, &joined)
    }

    fn from_normalized(namespace: &str, normalized: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        Self {
            namespace: sanitize_namespace(namespace),
            digest,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// File-name-safe string form: `{namespace}-{sha256 hex}`
    pub fn as_string(&self) -> String {
        format!("{}-{}", self.namespace, self.digest)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.namespace, self.digest)
    }
}

/// Trim, collapse internal whitespace, case-fold
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn sanitize_namespace(namespace: &str) -> String {
    let cleaned: String = namespace
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superficial_differences_collide() {
        let a = CacheKey::from_query("scholar", "  Ada   Lovelace ");
        let b = CacheKey::from_query("scholar", "ada lovelace");
        assert_eq!(a, b);
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let a = CacheKey::from_query("scholar", "ada lovelace");
        let b = CacheKey::from_query("patents", "ada lovelace");
        assert_ne!(a, b);
        assert!(a.as_string().starts_with("scholar-"));
    }

    #[test]
    fn test_param_order_is_irrelevant() {
        let a = CacheKey::from_params("search", &[("q", "Rust"), ("engine", "scholar")]);
        let b = CacheKey::from_params("search", &[("engine", "SCHOLAR"), ("q", "rust")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_values_differ() {
        let a = CacheKey::from_params("search", &[("q", "rust"), ("page", "0")]);
        let b = CacheKey::from_params("search", &[("q", "rust"), ("page", "1")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_namespace_is_file_safe() {
        let key = CacheKey::from_entity("Code Host/v3", "octocat");
        assert_eq!(key.namespace(), "code_host_v3");
        assert_eq!(key.to_string(), key.as_string());
        assert!(!key.as_string().contains('/'));
    }
}

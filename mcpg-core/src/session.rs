//! Credentials and session identifiers.
//!
//! Two unrelated things live here and must not be confused:
//!
//! - [`ApiKey`]: the credential inbound callers present in `Authorization`.
//! - [`SyntheticSession`]: an id the gateway generates when it acts as a
//!   client during a backend's `initialize` handshake.

use std::fmt;

/// Prefix shared by every gateway-generated session id.
pub const SYNTHETIC_SESSION_PREFIX: &str = "gateway-init-";

/// Header carrying the session id toward HTTP backends.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// A session id generated for one backend handshake.
///
/// Derived from the backend name plus a random suffix, so concurrent
/// initializations never share state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticSession(String);

impl SyntheticSession {
    pub fn generate(backend: &str) -> Self {
        Self(format!(
            "{SYNTHETIC_SESSION_PREFIX}{backend}-{}",
            uuid::Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyntheticSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of checking a presented credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialCheck {
    /// No key is configured; every caller is accepted.
    Disabled,
    Accepted,
    Missing,
    Mismatch,
}

/// The configured inbound credential. Never printed.
#[derive(Clone, Default)]
pub struct ApiKey(Option<String>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.is_empty()))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Compare a presented `Authorization` value verbatim. No scheme prefix
    /// is stripped.
    pub fn verify(&self, presented: Option<&str>) -> CredentialCheck {
        let Some(expected) = &self.0 else {
            return CredentialCheck::Disabled;
        };
        match presented {
            None | Some("") => CredentialCheck::Missing,
            Some(value) if constant_time_eq(value.as_bytes(), expected.as_bytes()) => {
                CredentialCheck::Accepted
            }
            Some(_) => CredentialCheck::Mismatch,
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("ApiKey([REDACTED])"),
            None => f.write_str("ApiKey(None)"),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_ids_are_prefixed_and_unique() {
        let a = SyntheticSession::generate("github");
        let b = SyntheticSession::generate("github");
        assert!(a.as_str().starts_with("gateway-init-github-"));
        assert!(b.as_str().starts_with(SYNTHETIC_SESSION_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_compares_verbatim() {
        let key = ApiKey::new(Some("secret-key".to_string()));
        assert_eq!(key.verify(Some("secret-key")), CredentialCheck::Accepted);
        assert_eq!(key.verify(Some("Bearer secret-key")), CredentialCheck::Mismatch);
        assert_eq!(key.verify(Some("secret-kez")), CredentialCheck::Mismatch);
        assert_eq!(key.verify(None), CredentialCheck::Missing);
        assert_eq!(key.verify(Some("")), CredentialCheck::Missing);
    }

    #[test]
    fn test_empty_key_disables_auth() {
        let key = ApiKey::new(Some(String::new()));
        assert!(!key.is_enabled());
        assert_eq!(key.verify(None), CredentialCheck::Disabled);
        assert_eq!(key.verify(Some("anything")), CredentialCheck::Disabled);
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = ApiKey::new(Some("hunter2".to_string()));
        let printed = format!("{key:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("REDACTED"));
    }
}

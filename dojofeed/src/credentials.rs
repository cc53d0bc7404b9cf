//! Credential handling for DefectDojo and GVM
//!
//! Wraps secrets in types that redact themselves in debug output, and
//! resolves the GVM password from the CLI flag or the `GVM_PASSWORD`
//! environment variable.
use crate::error::{FeedError, Result};
use log::error;
use std::env;

/// Environment variable consulted when `--gvm-password` is not given
pub const GVM_PASSWORD_ENV: &str = "GVM_PASSWORD";

/// Secure wrapper for the DefectDojo API token that redacts the value in
/// debug output
#[derive(Clone)]
pub struct SecureToken(String);

impl SecureToken {
    pub fn new(token: String) -> Self {
        SecureToken(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for SecureToken {
    fn from(token: String) -> Self {
        SecureToken(token)
    }
}

impl From<&str> for SecureToken {
    fn from(token: &str) -> Self {
        SecureToken(token.into())
    }
}

impl std::fmt::Debug for SecureToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SecureToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Resolve the GVM password from the CLI flag or the environment.
///
/// The flag takes precedence; `GVM_PASSWORD` is the fallback so the
/// password can stay out of shell history and process listings.
///
/// # Errors
///
/// Returns [`FeedError::InvalidConfig`] when neither source provides a
/// password.
pub fn resolve_gvm_password(flag_value: Option<String>) -> Result<String> {
    if let Some(password) = flag_value {
        return Ok(password);
    }

    match env::var(GVM_PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => {
            error!("❌ GVM password is required");
            error!("💡 Pass --gvm-password or set the GVM_PASSWORD environment variable");
            Err(FeedError::InvalidConfig(
                "Missing GVM password".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_token_redacts_debug_output() {
        let token = SecureToken::new("super-secret-token".to_string());
        assert_eq!(format!("{:?}", token), "[REDACTED]");
        assert_eq!(format!("{}", token), "[REDACTED]");
    }

    #[test]
    fn test_secure_token_preserves_value() {
        let token = SecureToken::from("abc123");
        assert_eq!(token.as_str(), "abc123");
        assert_eq!(token.into_string(), "abc123");
    }

    #[test]
    fn test_resolve_gvm_password_precedence() {
        // Single test so the shared environment variable is not raced by
        // parallel test threads.
        unsafe {
            env::remove_var(GVM_PASSWORD_ENV);
        }
        assert!(resolve_gvm_password(None).is_err());

        unsafe {
            env::set_var(GVM_PASSWORD_ENV, "from-env");
        }
        assert_eq!(resolve_gvm_password(None).unwrap(), "from-env");

        // Flag wins over the environment
        assert_eq!(
            resolve_gvm_password(Some("from-flag".to_string())).unwrap(),
            "from-flag"
        );

        unsafe {
            env::remove_var(GVM_PASSWORD_ENV);
        }
    }
}

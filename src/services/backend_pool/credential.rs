//! Credential type
//!
//! An upstream credential is an opaque bearer token plus a positional name
//! that is safe to put in logs.

use crate::utils::mask_secret;
use std::fmt;

/// A single upstream API key
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Display name (`key_1`, `key_2`, ...)
    name: String,
    /// The bearer token itself
    api_key: String,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
        }
    }

    /// Name used in logs in place of the secret
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw token, only for building the outbound `Authorization` header
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// `Authorization` header value for this credential
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("api_key", &mask_secret(&self.api_key))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_accessors() {
        let cred = Credential::new("hf_secret_token_value", "key_1");
        assert_eq!(cred.name(), "key_1");
        assert_eq!(cred.api_key(), "hf_secret_token_value");
        assert_eq!(cred.bearer(), "Bearer hf_secret_token_value");
    }

    #[test]
    fn test_debug_masks_secret() {
        let cred = Credential::new("hf_secret_token_value", "key_1");
        let debug = format!("{:?}", cred);
        assert!(debug.contains("key_1"));
        assert!(!debug.contains("hf_secret_token_value"));
    }
}

//! Credential Pool Implementation
//!
//! The pool is an ordered, immutable list of equivalent credentials. Order is
//! the failover order: the dispatcher always starts at the first entry.

use super::credential::Credential;
use crate::services::dispatcher::DispatchError;

// ============================================================================
// Credential Pool
// ============================================================================

/// Ordered set of upstream credentials
///
/// Loaded once at startup and shared read-only between requests.
#[derive(Debug, Clone, Default)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    /// Create a pool from raw keys, naming them by position
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials = keys
            .into_iter()
            .enumerate()
            .map(|(idx, key)| Credential::new(key, format!("key_{}", idx + 1)))
            .collect();
        Self { credentials }
    }

    /// Parse a newline-delimited key list
    ///
    /// Each line is trimmed and blank lines are skipped, so `\r\n` files and
    /// trailing newlines are accepted.
    pub fn from_newline_delimited(raw: &str) -> Self {
        Self::new(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        )
    }

    /// Credentials in failover order
    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    /// Get the number of credentials
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Check if the pool is empty
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Fail fast when there is nothing to dispatch with
    pub fn ensure_usable(&self) -> Result<(), DispatchError> {
        if self.is_empty() {
            return Err(DispatchError::NoCredentials);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

//! String utilities
//!
//! Contains helper functions for safe string manipulation.

/// Safely truncate a string at a character boundary
///
/// Truncates to at most `max_chars` characters, cutting only at a valid
/// UTF-8 boundary.
///
/// # Example
/// ```
/// use llm_failover_gateway::utils::truncate_str;
///
/// let text = "Hello, 世界!";
/// assert_eq!(truncate_str(text, 8), "Hello, 世");
/// assert_eq!(truncate_str(text, 100), "Hello, 世界!");
/// ```
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Mask a secret for logging, keeping only a short recognizable prefix
///
/// # Example
/// ```
/// use llm_failover_gateway::utils::mask_secret;
///
/// assert_eq!(mask_secret("hf_abcdefghijklmnop"), "hf_a...");
/// assert_eq!(mask_secret("short"), "***");
/// ```
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() > 12 {
        format!("{}...", truncate_str(secret, 4))
    } else {
        "***".to_string()
    }
}

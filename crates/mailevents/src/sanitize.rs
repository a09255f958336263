//! Helpers for sanitizing data before it enters log lines and span attributes.
//!
//! Logs are safe to share for debugging. These functions keep mailbox
//! credentials and full sender addresses out of them.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Placeholder shown instead of a stored password.
pub const PASSWORD_MASK: &str = "********";

/// Keeps only the domain of an email address.
///
/// - `jane.doe@example.com` → `***@example.com`
/// - `Jane <jane@example.com>` → `***@example.com`
/// - `not-an-address` → `***`
pub fn redact_address(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('>');
    match trimmed.rsplit_once('@') {
        Some((_, domain)) if !domain.is_empty() => format!("***@{}", domain),
        _ => "***".to_string(),
    }
}

/// Masks a secret for display: empty stays empty, anything else becomes
/// [`PASSWORD_MASK`].
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        PASSWORD_MASK.to_string()
    }
}

/// Shortens free text for log lines, cutting on a char boundary.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

/// Returns a short deterministic hash for correlating a value across log
/// lines without printing it.
pub fn hash_value(value: &str) -> String {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

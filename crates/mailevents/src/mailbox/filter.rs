//! Sender/subject candidate filter.

use crate::config::MailboxConfig;

use super::MessageSummary;

/// Returns true when the message passes both configured filters.
///
/// Each filter is a case-insensitive substring match; an unset or empty
/// filter accepts everything.
pub fn matches(summary: &MessageSummary, config: &MailboxConfig) -> bool {
    contains_ci(&summary.from_address, config.sender_filter.as_deref())
        && contains_ci(&summary.subject, config.subject_filter.as_deref())
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    match needle {
        None | Some("") => true,
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
    }
}

//! Record identifier pattern helpers.
//!
//! Record ids follow `<type>_<number>` (e.g. `email_001`). The template
//! resolver uses [`is_record_id`] to decide whether the first segment of
//! a path addresses a record, and the store uses [`matches_pattern`] for
//! `type_*`-style record scans.

use std::sync::OnceLock;

use regex::Regex;

/// First-segment record-id shape: `^[a-z_][a-z0-9_]*_\d+$`.
fn record_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*_\d+$").expect("static regex"))
}

/// Whether `s` has the shape of a record id.
#[must_use]
pub fn is_record_id(s: &str) -> bool {
    record_id_regex().is_match(s)
}

/// Whether a record id matches a scan pattern.
///
/// A trailing `*` matches any suffix (`email_*` matches `email_001`);
/// a pattern without `*` must match exactly.
#[must_use]
pub fn matches_pattern(record_id: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => record_id.starts_with(prefix),
        None => record_id == pattern,
    }
}

/// Format a 1-based record index, zero-padded to the default width of 3.
#[must_use]
pub fn format_index(index: usize) -> String {
    format!("{index:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_match() {
        for s in ["email_001", "order_12", "a_1", "invoice_line_007"] {
            assert!(is_record_id(s), "{s} should be a record id");
        }
    }

    #[test]
    fn non_record_ids_rejected() {
        for s in ["email", "Email_001", "email_", "_", "email-001", "1_2x"] {
            assert!(!is_record_id(s), "{s} should not be a record id");
        }
    }

    #[test]
    fn wildcard_pattern_matches_prefix() {
        assert!(matches_pattern("email_001", "email_*"));
        assert!(matches_pattern("email_002", "email_*"));
        assert!(!matches_pattern("order_001", "email_*"));
    }

    #[test]
    fn exact_pattern_requires_equality() {
        assert!(matches_pattern("email_001", "email_001"));
        assert!(!matches_pattern("email_001", "email_002"));
    }

    #[test]
    fn bare_star_matches_everything() {
        assert!(matches_pattern("email_001", "*"));
        assert!(matches_pattern("order_9", "*"));
    }

    #[test]
    fn index_is_zero_padded_to_three() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1234), "1234");
    }
}

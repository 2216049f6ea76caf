//! Identifier generation for scans and stream entries

use uuid::Uuid;

/// Generate a new opaque identifier (UUIDv4, hyphenated lowercase)
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Check whether a string is a canonical identifier produced by [`new_id`]
pub fn is_canonical(s: &str) -> bool {
    Uuid::parse_str(s)
        .map(|u| u.hyphenated().to_string() == s)
        .unwrap_or(false)
}

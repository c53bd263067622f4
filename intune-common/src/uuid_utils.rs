//! GUID utilities
//!
//! The Graph API uses the all-zero GUID to mean "no value set". Identifiers
//! equal to it must never be harvested or resolved.

use uuid::Uuid;

/// Textual form of the all-zero GUID as returned by the API
pub const SENTINEL_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

/// True when `s` is the all-zero sentinel GUID (any accepted UUID spelling)
pub fn is_sentinel(s: &str) -> bool {
    s == SENTINEL_GUID || parse(s).map(|u| u.is_nil()).unwrap_or(false)
}

/// True when `s` is a usable reference: non-empty and not the sentinel
pub fn is_resolvable_id(s: &str) -> bool {
    !s.trim().is_empty() && !is_sentinel(s)
}

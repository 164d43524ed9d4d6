//! `qrtr://<node>` URI helpers.
//!
//! Semantics follow the historical `qrtr_get_uri_for_node` / `qrtr_get_node_for_uri`
//! pair exactly: ASCII case-insensitive prefix match, then greedy decimal parse
//! of whatever digits follow.

pub const URI_PREFIX: &str = "qrtr://";

/// Format a node id as a `qrtr://` URI.
pub fn uri_for_node(node_id: u32) -> String {
    format!("{URI_PREFIX}{node_id}")
}

/// Parse a `qrtr://` URI back into a node id.
///
/// The prefix match is ASCII case-insensitive (`QRTR://`, `Qrtr://`, ... all
/// accepted), mirroring `g_ascii_strncasecmp`. Returns `None` if the prefix
/// doesn't match or no digits follow it. A decimal value that overflows `u32`
/// saturates to `u32::MAX` rather than wrapping or erroring.
pub fn node_for_uri(uri: &str) -> Option<u32> {
    if uri.len() < URI_PREFIX.len() {
        return None;
    }
    let (prefix, rest) = uri.split_at(URI_PREFIX.len());
    if !prefix.eq_ignore_ascii_case(URI_PREFIX) {
        return None;
    }

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

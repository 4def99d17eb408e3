//! Trace and span identifiers
//!
//! Identifiers are carried as hex strings exactly as the producer supplied them.
//! They are only checked, never decoded to bytes; the encoder decides whether an
//! item with a malformed id can ship.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex length of a trace id (16 bytes)
pub const TRACE_ID_HEX_LEN: usize = 32;
/// Hex length of a span id (8 bytes)
pub const SPAN_ID_HEX_LEN: usize = 16;

/// A 128-bit trace identifier in hex form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

/// A 64-bit span identifier in hex form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanId(String);

impl TraceId {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical lowercase form, or `None` if the id is malformed.
    pub fn canonical(&self) -> Option<String> {
        canonical_hex(&self.0, TRACE_ID_HEX_LEN)
    }
}

impl SpanId {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical lowercase form, or `None` if the id is malformed.
    pub fn canonical(&self) -> Option<String> {
        canonical_hex(&self.0, SPAN_ID_HEX_LEN)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed length, hex only, and not all zeros (the invalid id).
fn canonical_hex(raw: &str, len: usize) -> Option<String> {
    if raw.len() != len || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    if raw.chars().all(|c| c == '0') {
        return None;
    }
    Some(raw.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_canonical() {
        let id = TraceId::new("4BF92F3577B34DA6A3CE929D0E0E4736");
        assert_eq!(
            id.canonical().as_deref(),
            Some("4bf92f3577b34da6a3ce929d0e0e4736")
        );
    }

    #[test]
    fn test_trace_id_rejects_bad_length_and_chars() {
        assert!(TraceId::new("abc").canonical().is_none());
        assert!(TraceId::new("zzf92f3577b34da6a3ce929d0e0e4736").canonical().is_none());
        assert!(TraceId::new("0".repeat(32)).canonical().is_none());
    }

    #[test]
    fn test_span_id_canonical() {
        assert_eq!(
            SpanId::new("00f067aa0ba902b7").canonical().as_deref(),
            Some("00f067aa0ba902b7")
        );
        assert!(SpanId::new("00f067aa0ba902b").canonical().is_none());
        assert!(SpanId::new("0000000000000000").canonical().is_none());
    }
}

//! Wire formats shared by the transport session and the change-log
//! poller: the cloud-marker prefix and JSON value normalization.
//!
//! Grounded on `cloudconnection.cpp`'s message parsing/sending and
//! `cloudlogrecord.cpp`'s name/value extraction in
//! `examples/original_source`.

use serde::Serialize;
use serde_json::Value;

/// The cloud-variable name prefix: one non-ASCII glyph plus a space,
/// 4 UTF-8 bytes total.
pub const CLOUD_MARKER: &str = "\u{2601} ";

/// Strips the leading cloud marker from a wire-format variable name.
/// Names without the marker pass through unchanged (defensive: servers
/// are assumed to always send it, but a caller-facing client should not
/// panic on unexpected input).
pub fn strip_marker(name: &str) -> String {
    name.strip_prefix(CLOUD_MARKER).unwrap_or(name).to_string()
}

/// Prepends the cloud marker to a locally-stored variable name, for
/// outbound frames.
pub fn add_marker(name: &str) -> String {
    format!("{CLOUD_MARKER}{name}")
}

/// Normalizes a JSON `value` field to its canonical string form.
///
/// Numbers become their JSON decimal text (`3.14` -> `"3.14"`); strings
/// pass through unchanged; any other JSON type is a decode failure for
/// the enclosing record.
pub fn normalize_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct HandshakeFrame<'a> {
    pub method: &'static str,
    pub user: &'a str,
    pub project_id: &'a str,
}

impl<'a> HandshakeFrame<'a> {
    pub fn new(user: &'a str, project_id: &'a str) -> Self {
        Self {
            method: "handshake",
            user,
            project_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetFrame<'a> {
    pub method: &'static str,
    pub name: String,
    pub value: &'a str,
    pub user: &'a str,
    pub project_id: &'a str,
}

impl<'a> SetFrame<'a> {
    pub fn new(name: &str, value: &'a str, user: &'a str, project_id: &'a str) -> Self {
        Self {
            method: "set",
            name: add_marker(name),
            value,
            user,
            project_id,
        }
    }
}

/// One inbound record as sent by the server, either as part of a
/// real-time transport frame or reused to shape a change-log record.
/// Other fields present on the wire are ignored.
#[derive(Debug, serde::Deserialize)]
pub struct InboundRecord {
    pub name: String,
    pub value: Value,
}

/// Splits a raw transport frame into its newline-delimited JSON records,
/// dropping the trailing empty segment left by a trailing `\n`.
pub fn split_frame(raw: &str) -> impl Iterator<Item = &str> {
    raw.split('\n').filter(|segment| !segment.is_empty())
}

/// Parses one record, stripping the cloud marker and normalizing the
/// value. Returns `None` (and lets the caller log) on malformed input.
pub fn parse_record(segment: &str) -> Option<(String, String)> {
    let record: InboundRecord = match serde_json::from_str(segment) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("[WIRE] invalid message JSON '{segment}': {e}");
            return None;
        }
    };
    let value = match normalize_value(&record.value) {
        Some(v) => v,
        None => {
            log::warn!("[WIRE] unsupported value type in record '{segment}'");
            return None;
        }
    };
    Some((strip_marker(&record.name), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_round_trips() {
        let wired = add_marker("foo");
        assert_eq!(wired, "\u{2601} foo");
        assert_eq!(strip_marker(&wired), "foo");
    }

    #[test]
    fn numeric_value_normalizes_to_decimal_text() {
        let v: Value = serde_json::from_str("3.14").unwrap();
        assert_eq!(normalize_value(&v), Some("3.14".to_string()));
    }

    #[test]
    fn string_value_passes_through() {
        let v: Value = serde_json::from_str("\"3.14\"").unwrap();
        assert_eq!(normalize_value(&v), Some("3.14".to_string()));
    }

    #[test]
    fn non_scalar_value_is_rejected() {
        let v: Value = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(normalize_value(&v), None);
    }

    #[test]
    fn split_frame_drops_trailing_empty_segment() {
        let raw = "{\"a\":1}\n{\"b\":2}\n";
        let segments: Vec<&str> = split_frame(raw).collect();
        assert_eq!(segments, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn parse_record_strips_marker_and_skips_malformed() {
        let good = format!("{{\"name\":\"{}score\",\"value\":10}}", CLOUD_MARKER);
        assert_eq!(
            parse_record(&good),
            Some(("score".to_string(), "10".to_string()))
        );
        assert_eq!(parse_record("not json"), None);
    }
}

//! Change-log record decoding (spec.md §4.3, §6, §9's `RECORD_TYPES`
//! note).
//!
//! The verb table is modeled as an immutable lookup (a `match`, which
//! the compiler turns into exactly that) rather than the original's
//! mutable global map — grounded on the teacher's habit of encoding
//! small closed enums as `match`-based `FromStr`/`TryFrom` impls
//! (`engine/logic.rs`'s request-kind dispatch).

use serde_json::Value;

use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    CreateVar,
    DelVar,
    RenameVar,
    SetVar,
}

impl Verb {
    fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "create_var" => Some(Verb::CreateVar),
            "del_var" => Some(Verb::DelVar),
            "rename_var" => Some(Verb::RenameVar),
            "set_var" => Some(Verb::SetVar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeLogRecord {
    pub user: String,
    pub verb: Verb,
    pub name: String,
    pub value: String,
    pub timestamp: i64,
}

/// Decodes one raw change-log entry. Returns `None` for an unknown verb
/// or a structurally invalid record — both are logged by the caller,
/// which still advances `watermark` off the raw timestamp when present.
pub fn parse_record(raw: &Value) -> Option<ChangeLogRecord> {
    let user = raw.get("user")?.as_str()?.to_string();
    let verb = raw.get("verb")?.as_str().and_then(Verb::from_wire);
    let name = raw.get("name")?.as_str()?;
    let value = wire::normalize_value(raw.get("value")?)?;
    let timestamp = raw.get("timestamp")?.as_i64()?;

    let verb = match verb {
        Some(v) => v,
        None => {
            log::warn!(
                "[POLLER] unknown verb in change-log record for '{name}', ignoring"
            );
            return None;
        }
    };

    Some(ChangeLogRecord {
        user,
        verb,
        name: wire::strip_marker(name),
        value,
        timestamp,
    })
}

/// Best-effort timestamp extraction used to advance `watermark` even
/// for records whose verb is unknown or otherwise unsupported.
pub fn raw_timestamp(raw: &Value) -> Option<i64> {
    raw.get("timestamp")?.as_i64()
}

/// Fetches one page of the change log.
pub async fn fetch(
    http: &reqwest::Client,
    base_url: &str,
    project_id: &str,
    limit: u32,
    offset: u32,
) -> anyhow::Result<Vec<Value>> {
    let response = http
        .get(base_url)
        .query(&[
            ("projectid", project_id.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?;
    let records: Vec<Value> = response.json().await?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_sends_expected_query_params_and_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs"))
            .and(query_param("projectid", "42"))
            .and(query_param("limit", "25"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"user": "alice", "verb": "set_var", "name": "\u{2601} x", "value": 1, "timestamp": 10}
            ])))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let records = fetch(&http, &format!("{}/logs", server.uri()), "42", 25, 0)
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(parse_record(&records[0]).unwrap().name, "x");
    }

    #[test]
    fn parses_known_verb_and_strips_marker() {
        let raw = json!({
            "user": "alice",
            "verb": "set_var",
            "name": "\u{2601} highscore",
            "value": 42,
            "timestamp": 1000
        });
        let record = parse_record(&raw).unwrap();
        assert_eq!(record.user, "alice");
        assert_eq!(record.verb, Verb::SetVar);
        assert_eq!(record.name, "highscore");
        assert_eq!(record.value, "42");
        assert_eq!(record.timestamp, 1000);
    }

    #[test]
    fn unknown_verb_is_ignored() {
        let raw = json!({
            "user": "alice",
            "verb": "teleport_var",
            "name": "\u{2601} x",
            "value": "1",
            "timestamp": 1000
        });
        assert!(parse_record(&raw).is_none());
        assert_eq!(raw_timestamp(&raw), Some(1000));
    }
}

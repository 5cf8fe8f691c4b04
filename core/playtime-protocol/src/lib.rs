//! IPC protocol types and validation for playtime-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! Requests and responses are single-line JSON documents over a Unix socket;
//! the daemon answers each request with exactly one response line.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024; // 64KB
pub const ERROR_TOO_MANY_CONNECTIONS: &str = "too_many_connections";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    /// Subject connected; starts tracking and restores its display.
    Ready,
    /// Subject asked for its playtime in a partition; counts as activity.
    Command,
    Disconnect,
    ToggleDisplay,
    /// Read-only totals for a subject.
    GetPlaytime,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: None,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Params
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SubjectParams {
    pub subject_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PresenceParams {
    pub subject_id: String,
    pub partition_id: String,
}

/// `subject_id` parsed and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectTarget {
    pub subject: Uuid,
}

/// `subject_id` and `partition_id` parsed and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceTarget {
    pub subject: Uuid,
    pub partition: Uuid,
}

pub fn parse_subject_params(params: Option<Value>) -> Result<SubjectTarget, ErrorInfo> {
    let params: SubjectParams = decode_params(params)?;
    Ok(SubjectTarget {
        subject: require_uuid(&params.subject_id, "subject_id")?,
    })
}

pub fn parse_presence_params(params: Option<Value>) -> Result<PresenceTarget, ErrorInfo> {
    let params: PresenceParams = decode_params(params)?;
    Ok(PresenceTarget {
        subject: require_uuid(&params.subject_id, "subject_id")?,
        partition: require_uuid(&params.partition_id, "partition_id")?,
    })
}

fn decode_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorInfo> {
    let params = params.ok_or_else(|| ErrorInfo::new("invalid_params", "params are required"))?;
    serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new("invalid_params", format!("params are invalid: {}", err))
    })
}

/// Accepts only the canonical hyphenated form, in either case.
fn require_uuid(value: &str, field: &str) -> Result<Uuid, ErrorInfo> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ErrorInfo::new(
            "invalid_params",
            format!("{} is required", field),
        ));
    }
    if trimmed.len() != uuid::fmt::Hyphenated::LENGTH {
        return Err(ErrorInfo::new(
            "invalid_params",
            format!("{} must be a hyphenated UUID", field),
        ));
    }
    Uuid::parse_str(trimmed).map_err(|err| {
        ErrorInfo::new("invalid_params", format!("{} is not a UUID: {}", field, err))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Response payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthData {
    pub status: String,
    pub pid: u32,
    pub version: String,
    pub protocol_version: u32,
    pub tracked_subjects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadyData {
    pub display_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportData {
    pub partition_id: String,
    /// Closed time plus the live session.
    pub total_ms: u64,
    pub session_ms: u64,
    pub total_text: String,
    pub session_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToggleData {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaytimeData {
    pub subject_id: String,
    /// Closed time plus any open session.
    pub total_ms: u64,
    /// Closed time per partition id.
    pub partitions: BTreeMap<String, u64>,
    pub summary_text: String,
    /// Present only while a live display is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SUBJECT: &str = "6f1c2d9e-4b7a-4c53-9a0e-2f5d8b1e7c34";
    const PARTITION: &str = "0b8e7a52-91d3-4f6c-8e2a-5c7d9f1b3a60";

    #[test]
    fn parses_request_line() {
        let line = format!(
            r#"{{"protocol_version":1,"method":"command","id":"r1","params":{{"subject_id":"{}","partition_id":"{}"}}}}"#,
            SUBJECT, PARTITION
        );
        let request: Request = serde_json::from_str(&line).expect("request");
        assert_eq!(request.method, Method::Command);
        assert_eq!(request.id.as_deref(), Some("r1"));

        let target = parse_presence_params(request.params).expect("params");
        assert_eq!(target.subject.to_string(), SUBJECT);
        assert_eq!(target.partition.to_string(), PARTITION);
    }

    #[test]
    fn rejects_unknown_method() {
        let result = serde_json::from_str::<Request>(
            r#"{"protocol_version":1,"method":"explode"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_params() {
        let err = parse_subject_params(None).expect_err("missing");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn rejects_non_uuid_subject() {
        let err = parse_subject_params(Some(json!({ "subject_id": "steve" }))).expect_err("bad id");
        assert_eq!(err.code, "invalid_params");
        assert!(err.message.contains("subject_id"));
    }

    #[test]
    fn rejects_non_canonical_uuid() {
        let simple = SUBJECT.replace('-', "");
        let err = parse_subject_params(Some(json!({ "subject_id": simple }))).expect_err("simple form");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn rejects_missing_partition() {
        let err = parse_presence_params(Some(json!({ "subject_id": SUBJECT }))).expect_err("partial");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn rejects_unknown_param_fields() {
        let err = parse_subject_params(Some(json!({ "subject_id": SUBJECT, "extra": 1 })))
            .expect_err("extra");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn error_response_omits_data() {
        let response = Response::error(Some("r2".to_string()), "invalid_params", "nope");
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(value["ok"], json!(false));
        assert!(value.get("data").is_none());
        assert_eq!(value["error"]["code"], json!("invalid_params"));
    }
}

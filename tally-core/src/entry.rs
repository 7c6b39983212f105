use chrono::{DateTime, SecondsFormat, Utc};
use http::HeaderMap;
use http::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::submission::{Payload, Submission};

/// Transport metadata observed by the server for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub client_ip: String,
    pub user_agent: String,
    pub cf_ray: Option<String>,
    pub cf_country: Option<String>,
}

/// Provider headers consulted for request metadata.
pub mod headers {
    pub const CONNECTING_IP: &str = "cf-connecting-ip";
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
    pub const RAY: &str = "cf-ray";
    pub const COUNTRY: &str = "cf-ipcountry";
}

const UNKNOWN: &str = "unknown";

/// The record persisted for every accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: String,
    pub actual_request_details: RequestDetails,
    pub submitted_request_details: Value,
    pub payload: Payload,
}

/// Side-record written next to each entry so stores can index it without
/// parsing the full value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub source: String,
    pub summary: String,
    pub timestamp: String,
}

/// Source of receipt time and entry ids.
pub trait Stamper: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn new_id(&self) -> Uuid;
}

/// Wall clock + random v4 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStamper;

impl Stamper for SystemStamper {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn new_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// `2024-05-01T12:34:56.789Z`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `log_<timestamp with ':' and '.' as '-'>_<first 8 chars of id>`.
///
/// Keys sort by receipt time; the id suffix separates entries received in
/// the same millisecond.
pub fn storage_key(timestamp: &str, id: &str) -> String {
    let stamp: String = timestamp
        .chars()
        .map(|c| if c == ':' || c == '.' { '-' } else { c })
        .collect();
    let short: String = id.chars().take(8).collect();
    format!("log_{stamp}_{short}")
}

impl LogEntry {
    /// Build an entry from a validated submission, stamping id and time.
    pub fn new(submission: Submission, details: RequestDetails, stamper: &dyn Stamper) -> Self {
        Self {
            id: stamper.new_id().to_string(),
            timestamp: format_timestamp(stamper.now()),
            actual_request_details: details,
            submitted_request_details: submission.request_details,
            payload: submission.payload,
        }
    }

    pub fn storage_key(&self) -> String {
        storage_key(&self.timestamp, &self.id)
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            source: self.payload.source().to_string(),
            summary: self.payload.summary().to_string(),
            timestamp: self.timestamp.clone(),
        }
    }

    /// Two-space indented JSON, the form written to storage.
    pub fn to_stored_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl RequestDetails {
    /// Client IP prefers the provider's connecting-IP header, then
    /// `X-Forwarded-For` (verbatim), then `"unknown"`.
    ///
    /// Repeated header lines are joined with `", "`.
    pub fn from_headers(map: &HeaderMap) -> Self {
        let get = |name: &str| {
            let joined = map
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            Some(joined).filter(|v| !v.is_empty())
        };

        Self {
            client_ip: get(headers::CONNECTING_IP)
                .or_else(|| get(headers::FORWARDED_FOR))
                .unwrap_or_else(|| UNKNOWN.into()),
            user_agent: get(USER_AGENT.as_str()).unwrap_or_else(|| UNKNOWN.into()),
            cf_ray: get(headers::RAY),
            cf_country: get(headers::COUNTRY),
        }
    }
}

impl Default for RequestDetails {
    fn default() -> Self {
        Self {
            client_ip: UNKNOWN.into(),
            user_agent: UNKNOWN.into(),
            cf_ray: None,
            cf_country: None,
        }
    }
}

/// Empty object used when the client sends no `request_details`.
pub fn empty_details() -> Value {
    Value::Object(Map::new())
}

//! Structural validation of the client-supplied body.
//!
//! ```text
//! {
//!   "request_details": { ... },                 // optional, stored verbatim
//!   "payload": { "source": "..", "summary": "..", ... }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entry::empty_details;
use crate::error::ValidationError;

/// Client event data, kept exactly as sent (field order included).
/// `source` and `summary` are checked to be non-empty strings on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: Map<String, Value>,
}

/// A body that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub request_details: Value,
    pub payload: Payload,
}

impl Submission {
    /// Parse and validate a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut body) = value else {
            return Err(ValidationError::NotAnObject("body"));
        };

        let payload = match body.remove("payload") {
            None | Some(Value::Null) => return Err(ValidationError::MissingField("payload")),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ValidationError::NotAnObject("payload")),
        };

        // Any falsy value (null, false, 0, "") falls back to an empty object.
        let request_details = match body.remove("request_details") {
            None => empty_details(),
            Some(value) if is_falsy(&value) => empty_details(),
            Some(value) => value,
        };

        Ok(Self {
            request_details,
            payload: Payload::from_map(payload)?,
        })
    }
}

impl Payload {
    fn from_map(fields: Map<String, Value>) -> Result<Self, ValidationError> {
        check_required(&fields, "source", "payload.source")?;
        check_required(&fields, "summary", "payload.summary")?;
        Ok(Self { fields })
    }

    pub fn source(&self) -> &str {
        self.str_field("source")
    }

    pub fn summary(&self) -> &str {
        self.str_field("summary")
    }

    fn str_field(&self, key: &str) -> &str {
        self.fields.get(key).and_then(Value::as_str).unwrap_or_default()
    }
}

fn check_required(
    map: &Map<String, Value>,
    key: &str,
    label: &'static str,
) -> Result<(), ValidationError> {
    match map.get(key) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(label)),
        Some(Value::String(s)) if s.is_empty() => Err(ValidationError::EmptyField(label)),
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(ValidationError::WrongType(label)),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

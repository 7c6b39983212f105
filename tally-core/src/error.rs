use http::StatusCode;
use thiserror::Error;

/// Why a submission body was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request body could not be read")]
    BodyUnreadable,

    #[error("body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("{0} must be a JSON object")]
    NotAnObject(&'static str),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {0} must be a string")]
    WrongType(&'static str),

    #[error("field {0} must not be empty")]
    EmptyField(&'static str),
}

/// Unified error type for the collect path.
///
/// `Display` carries diagnostic detail for server-side logs only. Callers
/// only ever see [`CollectError::public_message`].
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("auth token is not configured")]
    Configuration,

    #[error("authentication failed: {0}")]
    Authentication(&'static str),

    #[error("bearer token mismatch")]
    Authorization,

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl CollectError {
    /// Map to HTTP status code.
    pub fn status(&self) -> StatusCode {
        match self {
            CollectError::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            CollectError::Authentication(_) => StatusCode::UNAUTHORIZED,
            CollectError::Authorization => StatusCode::FORBIDDEN,
            CollectError::Validation(_) => StatusCode::BAD_REQUEST,
            CollectError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed plain-text body returned to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            CollectError::Configuration => "Configuration error",
            CollectError::Authentication(_) => "Unauthorized",
            CollectError::Authorization => "Forbidden",
            CollectError::Validation(_) => "Bad Request",
            CollectError::Unexpected(_) => "Internal Server Error",
        }
    }

    /// Short label used for metrics and log fields.
    pub fn outcome(&self) -> &'static str {
        match self {
            CollectError::Configuration => "misconfigured",
            CollectError::Authentication(_) => "unauthorized",
            CollectError::Authorization => "forbidden",
            CollectError::Validation(_) => "invalid",
            CollectError::Unexpected(_) => "failed",
        }
    }
}

impl From<serde_json::Error> for CollectError {
    fn from(e: serde_json::Error) -> Self {
        CollectError::Unexpected(format!("serialization: {e}"))
    }
}

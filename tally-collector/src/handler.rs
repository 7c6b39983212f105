//! The collect endpoint.
//!
//! Order of checks: method, configured secret, bearer token, body, payload
//! shape. Whatever fails first decides the status; nothing is stored unless
//! every check passes.

use crate::server::CollectorState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tally_core::auth::authorize;
use tally_core::{CollectError, LogEntry, RequestDetails, Submission, ValidationError};
use tracing::{debug, error, info, warn};

fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

/// Anything that is not `POST` on the collect path.
pub async fn not_found() -> Response {
    plain(StatusCode::NOT_FOUND, "Not Found")
}

/// Body for panics caught by the panic layer.
pub fn panic_response(_err: Box<dyn Any + Send + 'static>) -> Response {
    error!("collect handler panicked");
    plain(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

pub async fn collect(State(state): State<Arc<CollectorState>>, request: Request) -> Response {
    if request.method() != Method::POST {
        return not_found().await;
    }

    let (parts, body) = request.into_parts();
    match accept(&state, &parts.headers, body).await {
        Ok(()) => {
            state.metrics.record_outcome("accepted", 200);
            plain(StatusCode::OK, "OK")
        }
        Err(err) => {
            match &err {
                CollectError::Configuration | CollectError::Unexpected(_) => {
                    error!(error = %err, "submission failed")
                }
                CollectError::Authentication(_) | CollectError::Authorization => {
                    warn!(error = %err, "submission rejected")
                }
                CollectError::Validation(_) => debug!(error = %err, "submission rejected"),
            }
            let status = err.status();
            state.metrics.record_outcome(err.outcome(), status.as_u16());
            plain(status, err.public_message())
        }
    }
}

async fn accept(
    state: &CollectorState,
    headers: &HeaderMap,
    body: Body,
) -> Result<(), CollectError> {
    authorize(headers, state.auth.expected_token())?;

    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| ValidationError::BodyUnreadable)?;
    let submission = Submission::parse(&bytes)?;

    let details = RequestDetails::from_headers(headers);
    let entry = LogEntry::new(submission, details, state.stamper.as_ref());

    if let Some(store) = &state.store {
        let key = entry.storage_key();
        let value = entry.to_stored_json()?;
        let started = Instant::now();
        store.put(&key, &value, &entry.metadata()).await?;
        state
            .metrics
            .record_store_write(store.kind(), started.elapsed().as_secs_f64());
    }

    info!(id = %entry.id, source = %entry.payload.source(), "log entry accepted");
    Ok(())
}

//! Integration tests for the collect endpoint.
//!
//! Uses `tower::ServiceExt::oneshot` to drive the router without binding a
//! TCP port. Each test gets a fresh in-memory store.

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use tally_collector::{CollectorState, build_router};
use tally_core::config::{AuthConfig, CollectorConfig};
use tally_core::entry::Stamper;
use tally_core::EntryMetadata;
use tally_store::{LogStore, MemoryStore, StoreError};
use tower::ServiceExt; // .oneshot()
use uuid::Uuid;

const TOKEN: &str = "test-token";

// ── Helpers ───────────────────────────────────────────────────

fn config(token: Option<&str>) -> CollectorConfig {
    let mut cfg = CollectorConfig::default();
    cfg.auth = AuthConfig {
        token: token.map(str::to_string),
    };
    cfg
}

fn app_with(cfg: &CollectorConfig, store: Option<Arc<dyn LogStore>>) -> axum::Router {
    let state = CollectorState::new(cfg, store).unwrap();
    build_router(cfg, Arc::new(state))
}

fn app(store: &MemoryStore) -> axum::Router {
    app_with(&config(Some(TOKEN)), Some(Arc::new(store.clone())))
}

fn post(body: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/collect")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = auth {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn bearer() -> String {
    format!("Bearer {TOKEN}")
}

const VALID: &str = r#"{"payload":{"source":"x","summary":"y"}}"#;

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

struct Fixed;

impl Stamper for Fixed {
    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap() + chrono::Duration::milliseconds(789)
    }

    fn new_id(&self) -> Uuid {
        Uuid::parse_str("a1b2c3d4-e5f6-4000-8000-000000000000").unwrap()
    }
}

struct FailingStore;

#[async_trait]
impl LogStore for FailingStore {
    async fn put(
        &self,
        _key: &str,
        _value: &str,
        _metadata: &EntryMetadata,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("kv namespace unavailable at 10.1.2.3".into()))
    }

    fn kind(&self) -> &'static str {
        "failing"
    }
}

// ── Method gate ───────────────────────────────────────────────

#[tokio::test]
async fn get_returns_404_not_found() {
    let store = MemoryStore::new();
    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/collect")
        .body(Body::empty())
        .unwrap();
    let resp = app(&store).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(resp).await, "Not Found");
}

#[tokio::test]
async fn non_post_methods_return_404_even_with_valid_auth_and_body() {
    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH, Method::OPTIONS] {
        let store = MemoryStore::new();
        let req = Request::builder()
            .method(method.clone())
            .uri("/api/collect")
            .header(header::AUTHORIZATION, bearer())
            .body(Body::from(VALID))
            .unwrap();
        let resp = app(&store).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{method}");
        assert!(store.is_empty());
    }
}

#[tokio::test]
async fn non_post_returns_404_even_when_unconfigured() {
    let cfg = config(None);
    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/collect")
        .body(Body::empty())
        .unwrap();
    let resp = app_with(&cfg, None).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_paths_return_404() {
    let store = MemoryStore::new();
    let mut req = post(VALID, Some(&bearer()));
    *req.uri_mut() = "/api/other".parse().unwrap();
    let resp = app(&store).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(resp).await, "Not Found");
}

// ── Configuration ─────────────────────────────────────────────

#[tokio::test]
async fn missing_secret_returns_500_configuration_error() {
    for token in [None, Some("")] {
        let cfg = config(token);
        let resp = app_with(&cfg, None)
            .oneshot(post(VALID, Some("Bearer anything")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, "Configuration error");
    }
}

// ── Authentication / authorization ───────────────────────────

#[tokio::test]
async fn missing_or_malformed_authorization_returns_401() {
    let store = MemoryStore::new();
    for auth in [None, Some("Basic dXNlcjpwYXNz"), Some("bearer test-token"), Some(TOKEN)] {
        let resp = app(&store).oneshot(post(VALID, auth)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
        assert_eq!(body_text(resp).await, "Unauthorized");
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn wrong_token_returns_403_and_writes_nothing() {
    let store = MemoryStore::new();
    let resp = app(&store)
        .oneshot(post(VALID, Some("Bearer not-the-token")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(resp).await, "Forbidden");
    assert!(store.is_empty());
}

#[tokio::test]
async fn auth_is_checked_before_body() {
    let store = MemoryStore::new();
    let resp = app(&store)
        .oneshot(post("not-json", Some("Bearer nope")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// ── Validation ────────────────────────────────────────────────

#[tokio::test]
async fn unparsable_json_returns_400() {
    let store = MemoryStore::new();
    let resp = app(&store)
        .oneshot(post("not-valid-json", Some(&bearer())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Bad Request");
    assert!(store.is_empty());
}

#[tokio::test]
async fn empty_object_returns_400_and_writes_nothing() {
    let store = MemoryStore::new();
    let resp = app(&store).oneshot(post("{}", Some(&bearer()))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Bad Request");
    assert!(store.is_empty());
}

#[tokio::test]
async fn missing_or_empty_required_fields_return_400() {
    let bodies = [
        json!({ "payload": { "summary": "y" } }),
        json!({ "payload": { "source": "x" } }),
        json!({ "payload": { "source": "", "summary": "y" } }),
        json!({ "payload": { "source": "x", "summary": "" } }),
        json!({ "payload": "x" }),
        json!([1, 2, 3]),
    ];
    for body in bodies {
        let store = MemoryStore::new();
        let resp = app(&store)
            .oneshot(post(&body.to_string(), Some(&bearer())))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        assert!(store.is_empty());
    }
}

#[tokio::test]
async fn oversized_body_returns_400() {
    let mut cfg = config(Some(TOKEN));
    cfg.server.max_body_bytes = 16;
    let store = MemoryStore::new();
    let resp = app_with(&cfg, Some(Arc::new(store.clone())))
        .oneshot(post(VALID, Some(&bearer())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(store.is_empty());
}

// ── Success ───────────────────────────────────────────────────

#[tokio::test]
async fn valid_submission_returns_200_and_stores_payload_verbatim() {
    let store = MemoryStore::new();
    let resp = app(&store).oneshot(post(VALID, Some(&bearer()))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    assert_eq!(body_text(resp).await, "OK");

    assert_eq!(store.len(), 1);
    let key = store.keys().remove(0);
    let record = store.get(&key).unwrap();
    let stored: Value = serde_json::from_str(&record.value).unwrap();
    assert_eq!(stored["payload"], json!({ "source": "x", "summary": "y" }));
    assert_eq!(stored["submitted_request_details"], json!({}));

    // log_<timestamp with : and . replaced>_<first 8 of id>
    let id = stored["id"].as_str().unwrap();
    let ts = stored["timestamp"].as_str().unwrap();
    let expected = format!("log_{}_{}", ts.replace([':', '.'], "-"), &id[..8]);
    assert_eq!(key, expected);

    assert_eq!(record.metadata.source, "x");
    assert_eq!(record.metadata.summary, "y");
    assert_eq!(record.metadata.timestamp, ts);
}

#[tokio::test]
async fn key_is_derived_from_server_time_and_id() {
    let cfg = config(Some(TOKEN));
    let store = MemoryStore::new();
    let state = CollectorState::new(&cfg, Some(Arc::new(store.clone())))
        .unwrap()
        .with_stamper(Arc::new(Fixed));
    let app = build_router(&cfg, Arc::new(state));

    let resp = app.oneshot(post(VALID, Some(&bearer()))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(store.keys(), vec!["log_2024-05-01T12-34-56-789Z_a1b2c3d4".to_string()]);
}

#[tokio::test]
async fn request_metadata_is_server_observed() {
    let store = MemoryStore::new();
    let body = json!({
        "request_details": { "client_ip": "127.0.0.1", "user_agent": "Test-Script/1.0" },
        "payload": { "source": "test-script", "summary": "Testing", "data": { "test": true } }
    });
    let mut req = post(&body.to_string(), Some(&bearer()));
    let headers = req.headers_mut();
    headers.insert("cf-connecting-ip", "203.0.113.7".parse().unwrap());
    headers.insert("x-forwarded-for", "198.51.100.1".parse().unwrap());
    headers.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());
    headers.insert("cf-ipcountry", "DE".parse().unwrap());

    let resp = app(&store).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let record = store.get(&store.keys()[0]).unwrap();
    let stored: Value = serde_json::from_str(&record.value).unwrap();
    assert_eq!(
        stored["actual_request_details"],
        json!({
            "client_ip": "203.0.113.7",
            "user_agent": "curl/8.0",
            "cf_ray": null,
            "cf_country": "DE"
        })
    );
    assert_eq!(stored["submitted_request_details"], body["request_details"]);
    assert_eq!(stored["payload"], body["payload"]);
}

#[tokio::test]
async fn stored_client_objects_keep_key_order() {
    let store = MemoryStore::new();
    let payload = r#"{"summary":"y","source":"x","zeta":{"b":1,"a":2},"alpha":2}"#;
    let details = r#"{"z":1,"a":2}"#;
    let body = format!(r#"{{"request_details":{details},"payload":{payload}}}"#);

    let resp = app(&store).oneshot(post(&body, Some(&bearer()))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let record = store.get(&store.keys()[0]).unwrap();
    let stored: Value = serde_json::from_str(&record.value).unwrap();
    assert_eq!(serde_json::to_string(&stored["payload"]).unwrap(), payload);
    assert_eq!(
        serde_json::to_string(&stored["submitted_request_details"]).unwrap(),
        details
    );
    assert!(record.value.contains("\"summary\": \"y\",\n    \"source\": \"x\""));
}

#[tokio::test]
async fn repeated_forwarded_for_headers_are_joined() {
    let store = MemoryStore::new();
    let mut req = post(VALID, Some(&bearer()));
    let headers = req.headers_mut();
    headers.append("x-forwarded-for", "198.51.100.1".parse().unwrap());
    headers.append("x-forwarded-for", "10.0.0.2, 10.0.0.3".parse().unwrap());

    let resp = app(&store).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let record = store.get(&store.keys()[0]).unwrap();
    let stored: Value = serde_json::from_str(&record.value).unwrap();
    assert_eq!(
        stored["actual_request_details"]["client_ip"],
        "198.51.100.1, 10.0.0.2, 10.0.0.3"
    );
}

#[tokio::test]
async fn identical_submissions_produce_two_entries() {
    let store = MemoryStore::new();
    for _ in 0..2 {
        let resp = app(&store).oneshot(post(VALID, Some(&bearer()))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
    assert_eq!(store.len(), 2);
    let ids: Vec<String> = store
        .keys()
        .iter()
        .map(|k| {
            let v: Value = serde_json::from_str(&store.get(k).unwrap().value).unwrap();
            v["id"].as_str().unwrap().to_string()
        })
        .collect();
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn no_store_configured_still_succeeds() {
    let cfg = config(Some(TOKEN));
    let resp = app_with(&cfg, None)
        .oneshot(post(VALID, Some(&bearer())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_text(resp).await, "OK");
}

// ── Failures ──────────────────────────────────────────────────

#[tokio::test]
async fn store_failure_returns_generic_500() {
    let cfg = config(Some(TOKEN));
    let resp = app_with(&cfg, Some(Arc::new(FailingStore)))
        .oneshot(post(VALID, Some(&bearer())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(resp).await;
    assert_eq!(text, "Internal Server Error");
    assert!(!text.contains("10.1.2.3"));
}

// ── Metrics ───────────────────────────────────────────────────

#[tokio::test]
async fn metrics_route_reports_outcomes_when_enabled() {
    let mut cfg = config(Some(TOKEN));
    cfg.observability.prometheus.enabled = true;
    let state = Arc::new(CollectorState::new(&cfg, None).unwrap());

    build_router(&cfg, Arc::clone(&state))
        .oneshot(post(VALID, Some("Bearer wrong")))
        .await
        .unwrap();

    let req = Request::builder()
        .method(Method::GET)
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = build_router(&cfg, state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let text = body_text(resp).await;
    assert!(text.contains("tally_collect_requests_total"));
    assert!(text.contains("forbidden"));
}

#[tokio::test]
async fn metrics_route_absent_when_disabled() {
    let store = MemoryStore::new();
    let req = Request::builder()
        .method(Method::GET)
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let resp = app(&store).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

use crate::handler;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{any, get},
};
use std::future::Future;
use std::sync::Arc;
use tally_core::config::{AuthConfig, CollectorConfig};
use tally_core::entry::{Stamper, SystemStamper};
use tally_observability::CollectMetrics;
use tally_store::LogStore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Everything the handler needs, injected once at startup.
pub struct CollectorState {
    pub auth: AuthConfig,
    /// `None` keeps the endpoint working without persisting anything.
    pub store: Option<Arc<dyn LogStore>>,
    pub stamper: Arc<dyn Stamper>,
    pub metrics: Arc<CollectMetrics>,
    pub max_body_bytes: usize,
}

impl CollectorState {
    pub fn new(config: &CollectorConfig, store: Option<Arc<dyn LogStore>>) -> anyhow::Result<Self> {
        Ok(Self {
            auth: config.auth.clone(),
            store,
            stamper: Arc::new(SystemStamper),
            metrics: Arc::new(CollectMetrics::new(config.observability.prometheus.enabled)?),
            max_body_bytes: config.server.max_body_bytes,
        })
    }

    pub fn with_stamper(mut self, stamper: Arc<dyn Stamper>) -> Self {
        self.stamper = stamper;
        self
    }
}

/// Build the router: the collect route plus the optional metrics route.
/// Every other path answers 404 "Not Found".
pub fn build_router(config: &CollectorConfig, state: Arc<CollectorState>) -> Router {
    let mut router = Router::new().route(&config.server.collect_path, any(handler::collect));

    let prom = &config.observability.prometheus;
    if prom.enabled && prom.path != config.server.collect_path {
        router = router.route(&prom.path, get(metrics_handler));
    }

    router
        .fallback(handler::not_found)
        .layer(CatchPanicLayer::custom(handler::panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics_handler(State(state): State<Arc<CollectorState>>) -> (StatusCode, String) {
    (StatusCode::OK, state.metrics.render())
}

/// HTTP server for the collect endpoint.
pub struct CollectorServer {
    config: CollectorConfig,
    state: Arc<CollectorState>,
}

impl CollectorServer {
    pub fn new(config: CollectorConfig, state: CollectorState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Serve until `shutdown` resolves; in-flight requests are drained.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let app = build_router(&self.config, Arc::clone(&self.state));
        let listener = tokio::net::TcpListener::bind(&self.config.server.addr).await?;

        info!(
            addr = %listener.local_addr()?,
            path = %self.config.server.collect_path,
            store = self.state.store.as_ref().map(|s| s.kind()).unwrap_or("none"),
            "Starting collector"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

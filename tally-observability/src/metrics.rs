use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Collect-path metrics. When disabled nothing is registered and every
/// record call returns immediately.
pub struct CollectMetrics {
    enabled: bool,
    registry: Option<Registry>,
    pub requests_total: Option<IntCounterVec>,
    pub store_write_duration: Option<HistogramVec>,
}

impl CollectMetrics {
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("collect_requests_total", "Collect requests by outcome").namespace("tally"),
            &["outcome", "status"],
        )?;

        let store_write_duration = HistogramVec::new(
            HistogramOpts::new("store_write_duration_seconds", "Storage put latency")
                .namespace("tally")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["backend"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(store_write_duration.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            requests_total: Some(requests_total),
            store_write_duration: Some(store_write_duration),
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            requests_total: None,
            store_write_duration: None,
        }
    }

    #[inline]
    pub fn record_outcome(&self, outcome: &str, status: u16) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.requests_total {
            let mut buf = itoa::Buffer::new();
            counter.with_label_values(&[outcome, buf.format(status)]).inc();
        }
    }

    #[inline]
    pub fn record_store_write(&self, backend: &str, duration_secs: f64) {
        if let Some(ref hist) = self.store_write_duration {
            hist.with_label_values(&[backend]).observe(duration_secs);
        }
    }

    /// Render prometheus text exposition format.
    pub fn render(&self) -> String {
        let Some(ref registry) = self.registry else {
            return String::new();
        };
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer).unwrap_or(());
        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

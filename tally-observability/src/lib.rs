pub mod logger;

#[cfg(feature = "prometheus")]
pub mod metrics;

#[cfg(feature = "prometheus")]
pub use metrics::CollectMetrics;

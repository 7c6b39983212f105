use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Top-level collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_collect_path")]
    pub collect_path: String,
    /// Bodies larger than this are rejected as unreadable.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Shared-secret settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Expected bearer token. Empty counts as unset.
    #[serde(default)]
    pub token: Option<String>,
}

/// Which backend receives accepted entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default)]
    pub file: FileStoreConfig,
    #[serde(default)]
    pub etcd: EtcdConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Entries are validated and acknowledged but not persisted.
    None,
    Memory,
    File,
    Etcd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    #[serde(default = "default_file_dir")]
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    #[serde(default = "default_etcd_endpoints")]
    pub endpoints: Vec<String>,
    #[serde(default = "default_etcd_prefix")]
    pub prefix: String,
    #[serde(default = "default_etcd_timeout")]
    pub timeout_secs: u64,
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, no counters are registered or updated.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_addr() -> String { "0.0.0.0:8788".into() }
fn default_collect_path() -> String { "/api/collect".into() }
fn default_max_body_bytes() -> usize { 1024 * 1024 }
fn default_backend() -> StorageBackend { StorageBackend::None }
fn default_file_dir() -> String { "data/logs".into() }
fn default_etcd_endpoints() -> Vec<String> { vec!["http://127.0.0.1:2379".into()] }
fn default_etcd_prefix() -> String { "/tally".into() }
fn default_etcd_timeout() -> u64 { 5 }
fn default_log_format() -> LogFormat { LogFormat::Text }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            collect_path: default_collect_path(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            file: FileStoreConfig::default(),
            etcd: EtcdConfig::default(),
        }
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self { dir: default_file_dir() }
    }
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: default_etcd_endpoints(),
            prefix: default_etcd_prefix(),
            timeout_secs: default_etcd_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl AuthConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()) }
    }

    /// The configured secret, or `None` when unset or empty.
    pub fn expected_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = self.expected_token().map(|_| "<redacted>");
        f.debug_struct("AuthConfig").field("token", &token).finish()
    }
}

impl CollectorConfig {
    /// Load configuration from YAML file + env overrides.
    ///
    /// `TALLY_`-prefixed variables nest on `__` (`TALLY_STORAGE__BACKEND=file`).
    /// A bare `AUTH_TOKEN` is honoured as `auth.token`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Defaults + env only, for running without a config file.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::env_layers(Figment::new()).extract()?)
    }

    /// Reject settings the router cannot be built from.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.server.collect_path.starts_with('/') {
            anyhow::bail!("server.collect_path must start with '/': {}", self.server.collect_path);
        }
        let prom = &self.observability.prometheus;
        if prom.enabled && !prom.path.starts_with('/') {
            anyhow::bail!("observability.prometheus.path must start with '/': {}", prom.path);
        }
        if self.server.max_body_bytes == 0 {
            anyhow::bail!("server.max_body_bytes must be greater than zero");
        }
        Ok(())
    }

    fn figment(path: &Path) -> Figment {
        Self::env_layers(Figment::new().merge(Yaml::file(path)))
    }

    fn env_layers(figment: Figment) -> Figment {
        figment
            .merge(Env::prefixed("TALLY_").split("__"))
            .merge(Env::raw().only(&["AUTH_TOKEN"]).map(|_| "auth.token".into()))
    }
}

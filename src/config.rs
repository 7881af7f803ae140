// =============================================================================
// System Configuration — typed sections, validation, atomic snapshot store
// =============================================================================
//
// The configuration document is TOML with five sections: server, performance,
// features, logging, monitoring. Every field carries a serde default so an
// older file missing new fields still loads.
//
// Callers read through `ConfigStore::snapshot()`, which hands out an
// `Arc<Config>` valid for the caller's scope regardless of concurrent
// reloads. Reloads swap the Arc atomically; validation failure retains the
// previous snapshot.
// =============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::reload::FileWatcher;

// =============================================================================
// Errors
// =============================================================================

/// Failure loading or validating a configuration artifact.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("config validation error in [{section}] {field}: {reason}")]
    Validation {
        section: String,
        field: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(section: &str, field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            section: section.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_threads() -> u32 {
    8
}

fn default_keep_alive_timeout() -> u32 {
    60
}

fn default_max_connections() -> u32 {
    10_000
}

fn default_target_p99_ms() -> f64 {
    50.0
}

fn default_target_qps() -> f64 {
    10_000.0
}

fn default_max_memory_gb() -> f64 {
    8.0
}

fn default_max_cpu_percent() -> f64 {
    80.0
}

fn default_true() -> bool {
    true
}

fn default_cache_size_mb() -> u64 {
    512
}

fn default_cache_ttl_seconds() -> u64 {
    300
}

fn default_l1_size_mb() -> u64 {
    256
}

fn default_l1_ttl_seconds() -> u64 {
    60
}

fn default_l2_size_mb() -> u64 {
    1024
}

fn default_l2_ttl_seconds() -> u64 {
    600
}

fn default_l3_size_mb() -> u64 {
    4096
}

fn default_l3_ttl_seconds() -> u64 {
    3600
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file_path() -> String {
    "logs/meridian.log".to_string()
}

fn default_log_max_size_mb() -> u32 {
    100
}

fn default_log_max_files() -> u32 {
    10
}

fn default_prometheus_port() -> u16 {
    9090
}

fn default_metrics_interval_seconds() -> u32 {
    15
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_model_version() -> String {
    "meridian-v1".to_string()
}

fn default_reload_interval_seconds() -> u64 {
    5
}

// =============================================================================
// Sections
// =============================================================================

/// Listener and worker sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Decision worker threads, bounded 1..=64.
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Keep-alive timeout in seconds, bounded 1..=3600.
    #[serde(default = "default_keep_alive_timeout")]
    pub keep_alive_timeout: u32,

    /// Connection cap, bounded 1..=100_000.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            threads: default_threads(),
            keep_alive_timeout: default_keep_alive_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

/// Latency and throughput envelopes the engine is tuned against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// p99 latency target in milliseconds, in (0, 10_000].
    #[serde(default = "default_target_p99_ms")]
    pub target_p99_ms: f64,

    /// Steady-state decisions per second, in (0, 1_000_000].
    #[serde(default = "default_target_qps")]
    pub target_qps: f64,

    /// Memory ceiling in GB, in (0, 128].
    #[serde(default = "default_max_memory_gb")]
    pub max_memory_gb: f64,

    /// CPU ceiling in percent, in (0, 100].
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            target_p99_ms: default_target_p99_ms(),
            target_qps: default_target_qps(),
            max_memory_gb: default_max_memory_gb(),
            max_cpu_percent: default_max_cpu_percent(),
        }
    }
}

/// Feature-lookup cache tiers and optional Redis sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub enable_cache: bool,

    #[serde(default = "default_cache_size_mb")]
    pub cache_size_mb: u64,

    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// L1 tier: size up to 16 GB, TTL up to 1 h.
    #[serde(default = "default_l1_size_mb")]
    pub l1_cache_size_mb: u64,

    #[serde(default = "default_l1_ttl_seconds")]
    pub l1_ttl_seconds: u64,

    /// L2 tier: size up to 4 GB, TTL up to 2 h.
    #[serde(default = "default_l2_size_mb")]
    pub l2_cache_size_mb: u64,

    #[serde(default = "default_l2_ttl_seconds")]
    pub l2_ttl_seconds: u64,

    /// L3 tier: size up to 32 GB, TTL up to 24 h.
    #[serde(default = "default_l3_size_mb")]
    pub l3_cache_size_mb: u64,

    #[serde(default = "default_l3_ttl_seconds")]
    pub l3_ttl_seconds: u64,

    #[serde(default)]
    pub enable_redis: bool,

    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            cache_size_mb: default_cache_size_mb(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            l1_cache_size_mb: default_l1_size_mb(),
            l1_ttl_seconds: default_l1_ttl_seconds(),
            l2_cache_size_mb: default_l2_size_mb(),
            l2_ttl_seconds: default_l2_ttl_seconds(),
            l3_cache_size_mb: default_l3_size_mb(),
            l3_ttl_seconds: default_l3_ttl_seconds(),
            enable_redis: false,
            redis_host: default_redis_host(),
            redis_port: default_redis_port(),
        }
    }
}

/// Log sinks and rotation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of: trace, debug, info, warn, error, critical, off.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_file_path")]
    pub file_path: String,

    /// Rotation size in MB, in (0, 1024].
    #[serde(default = "default_log_max_size_mb")]
    pub max_size_mb: u32,

    /// Rotated file count, in (0, 100].
    #[serde(default = "default_log_max_files")]
    pub max_files: u32,

    #[serde(default = "default_true")]
    pub enable_console: bool,

    #[serde(default)]
    pub enable_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_path: default_log_file_path(),
            max_size_mb: default_log_max_size_mb(),
            max_files: default_log_max_files(),
            enable_console: true,
            enable_file: false,
        }
    }
}

const VALID_LOG_LEVELS: [&str; 7] = ["trace", "debug", "info", "warn", "error", "critical", "off"];

/// Prometheus exposition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_true")]
    pub enable_prometheus: bool,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,

    /// Collection interval in seconds, in (0, 3600].
    #[serde(default = "default_metrics_interval_seconds")]
    pub metrics_interval_seconds: u32,

    /// Exposition path; must begin with "/".
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
            prometheus_port: default_prometheus_port(),
            metrics_interval_seconds: default_metrics_interval_seconds(),
            metrics_path: default_metrics_path(),
        }
    }
}

// =============================================================================
// Config
// =============================================================================

/// Top-level system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Version string reported in every decision response.
    #[serde(default = "default_model_version")]
    pub model_version: String,

    /// Poll interval for artifact watchers, seconds.
    #[serde(default = "default_reload_interval_seconds")]
    pub reload_interval_seconds: u64,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub features: FeaturesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_version: default_model_version(),
            reload_interval_seconds: default_reload_interval_seconds(),
            server: ServerConfig::default(),
            performance: PerformanceConfig::default(),
            features: FeaturesConfig::default(),
            logging: LoggingConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::Parse(format!("{}: {e}", path.display()))
            }
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;

        info!(
            path = %path.display(),
            host = %config.server.host,
            port = config.server.port,
            threads = config.server.threads,
            model_version = %config.model_version,
            "system config loaded"
        );

        Ok(config)
    }

    /// Range-check every recognized option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.server;
        if s.port == 0 {
            return Err(ConfigError::invalid("server", "port", "must be 1..=65535"));
        }
        if !(1..=64).contains(&s.threads) {
            return Err(ConfigError::invalid("server", "threads", "must be 1..=64"));
        }
        if !(1..=3600).contains(&s.keep_alive_timeout) {
            return Err(ConfigError::invalid(
                "server",
                "keep_alive_timeout",
                "must be 1..=3600 seconds",
            ));
        }
        if !(1..=100_000).contains(&s.max_connections) {
            return Err(ConfigError::invalid(
                "server",
                "max_connections",
                "must be 1..=100000",
            ));
        }

        let p = &self.performance;
        if !(p.target_p99_ms > 0.0 && p.target_p99_ms <= 10_000.0) {
            return Err(ConfigError::invalid(
                "performance",
                "target_p99_ms",
                "must be in (0, 10000]",
            ));
        }
        if !(p.target_qps > 0.0 && p.target_qps <= 1_000_000.0) {
            return Err(ConfigError::invalid(
                "performance",
                "target_qps",
                "must be in (0, 1000000]",
            ));
        }
        if !(p.max_memory_gb > 0.0 && p.max_memory_gb <= 128.0) {
            return Err(ConfigError::invalid(
                "performance",
                "max_memory_gb",
                "must be in (0, 128]",
            ));
        }
        if !(p.max_cpu_percent > 0.0 && p.max_cpu_percent <= 100.0) {
            return Err(ConfigError::invalid(
                "performance",
                "max_cpu_percent",
                "must be in (0, 100]",
            ));
        }

        let f = &self.features;
        if f.l1_cache_size_mb > 16 * 1024 {
            return Err(ConfigError::invalid(
                "features",
                "l1_cache_size_mb",
                "must be at most 16384 (16 GB)",
            ));
        }
        if f.l1_ttl_seconds > 3600 {
            return Err(ConfigError::invalid(
                "features",
                "l1_ttl_seconds",
                "must be at most 3600 (1 h)",
            ));
        }
        if f.l2_cache_size_mb > 4 * 1024 {
            return Err(ConfigError::invalid(
                "features",
                "l2_cache_size_mb",
                "must be at most 4096 (4 GB)",
            ));
        }
        if f.l2_ttl_seconds > 7200 {
            return Err(ConfigError::invalid(
                "features",
                "l2_ttl_seconds",
                "must be at most 7200 (2 h)",
            ));
        }
        if f.l3_cache_size_mb > 32 * 1024 {
            return Err(ConfigError::invalid(
                "features",
                "l3_cache_size_mb",
                "must be at most 32768 (32 GB)",
            ));
        }
        if f.l3_ttl_seconds > 86_400 {
            return Err(ConfigError::invalid(
                "features",
                "l3_ttl_seconds",
                "must be at most 86400 (24 h)",
            ));
        }

        let l = &self.logging;
        if !VALID_LOG_LEVELS.contains(&l.level.as_str()) {
            return Err(ConfigError::invalid(
                "logging",
                "level",
                format!("unknown level '{}'", l.level),
            ));
        }
        if l.file_path.is_empty() {
            return Err(ConfigError::invalid(
                "logging",
                "file_path",
                "must be non-empty",
            ));
        }
        if !(1..=1024).contains(&l.max_size_mb) {
            return Err(ConfigError::invalid(
                "logging",
                "max_size_mb",
                "must be in (0, 1024]",
            ));
        }
        if !(1..=100).contains(&l.max_files) {
            return Err(ConfigError::invalid(
                "logging",
                "max_files",
                "must be in (0, 100]",
            ));
        }

        let m = &self.monitoring;
        if !(1..=3600).contains(&m.metrics_interval_seconds) {
            return Err(ConfigError::invalid(
                "monitoring",
                "metrics_interval_seconds",
                "must be in (0, 3600]",
            ));
        }
        if !m.metrics_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "monitoring",
                "metrics_path",
                "must begin with '/'",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// ConfigStore
// =============================================================================

/// Observer invoked after a successful reload with the fresh snapshot.
pub type ConfigObserver = Box<dyn Fn(&Config) + Send + Sync>;

/// Holds the active configuration snapshot and its file watcher.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
    watcher: Mutex<Option<FileWatcher>>,
    observer: Mutex<Option<Arc<ConfigObserver>>>,
    last_error: RwLock<Option<String>>,
}

impl ConfigStore {
    /// Load `path` and build a store around the result.
    pub fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>, ConfigError> {
        let path = path.into();
        let config = Config::load(&path)?;
        Ok(Arc::new(Self {
            path,
            current: RwLock::new(Arc::new(config)),
            watcher: Mutex::new(None),
            observer: Mutex::new(None),
            last_error: RwLock::new(None),
        }))
    }

    /// Build a store holding `config` without a backing file (tests, defaults).
    pub fn with_config(config: Config) -> Arc<Self> {
        Arc::new(Self {
            path: PathBuf::new(),
            current: RwLock::new(Arc::new(config)),
            watcher: Mutex::new(None),
            observer: Mutex::new(None),
            last_error: RwLock::new(None),
        })
    }

    /// Current snapshot. The returned Arc stays valid for the caller's scope
    /// regardless of concurrent reloads.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    pub fn server(&self) -> ServerConfig {
        self.snapshot().server.clone()
    }

    pub fn performance(&self) -> PerformanceConfig {
        self.snapshot().performance.clone()
    }

    pub fn features(&self) -> FeaturesConfig {
        self.snapshot().features.clone()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.snapshot().logging.clone()
    }

    pub fn monitoring(&self) -> MonitoringConfig {
        self.snapshot().monitoring.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Re-read the backing file now. On success the snapshot is swapped and
    /// the observer (if any) is notified; on failure the previous snapshot is
    /// retained and the error recorded.
    pub fn reload(&self) -> Result<(), ConfigError> {
        match Config::load(&self.path) {
            Ok(config) => {
                let snapshot = Arc::new(config);
                *self.current.write() = snapshot.clone();
                *self.last_error.write() = None;
                if let Some(observer) = self.observer.lock().clone() {
                    (observer.as_ref())(&snapshot);
                }
                info!(path = %self.path.display(), "system config reloaded");
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "config reload failed — keeping previous snapshot");
                *self.last_error.write() = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Start watching the backing file. Replaces any previous watcher.
    pub fn enable_watch(self: &Arc<Self>, interval: Duration, observer: Option<ConfigObserver>) {
        *self.observer.lock() = observer.map(Arc::new);

        let store = Arc::downgrade(self);
        let watcher = FileWatcher::spawn(self.path.clone(), interval, move || {
            if let Some(store) = store.upgrade() {
                let _ = store.reload();
            }
        });
        *self.watcher.lock() = Some(watcher);
    }

    /// Stop watching. Idempotent.
    pub fn disable_watch(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("meridian-config-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn default_config_validates() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.threads, 8);
        assert!((cfg.performance.target_p99_ms - 50.0).abs() < f64::EPSILON);
        assert!(cfg.monitoring.metrics_path.starts_with('/'));
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.features.enable_cache);
        assert!(!cfg.features.enable_redis);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            port = 9000
            threads = 4
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.threads, 4);
        assert_eq!(cfg.server.max_connections, 10_000);
    }

    #[test]
    fn load_missing_file_is_file_not_found() {
        let err = Config::load(scratch_path("nonexistent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_garbage_is_parse_error() {
        let path = scratch_path("garbage.toml");
        std::fs::write(&path, "{{{{not toml").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn out_of_range_threads_rejected() {
        let mut cfg = Config::default();
        cfg.server.threads = 65;
        let err = cfg.validate().unwrap_err();
        match err {
            ConfigError::Validation { section, field, .. } => {
                assert_eq!(section, "server");
                assert_eq!(field, "threads");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cache_tier_maxima_enforced() {
        let mut cfg = Config::default();
        cfg.features.l1_cache_size_mb = 16 * 1024 + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.features.l3_ttl_seconds = 86_401;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.features.l2_cache_size_mb = 4096;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn unknown_log_level_rejected() {
        let mut cfg = Config::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn metrics_path_must_be_absolute() {
        let mut cfg = Config::default();
        cfg.monitoring.metrics_path = "metrics".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn store_reload_swaps_snapshot() {
        let path = scratch_path("reload.toml");
        std::fs::write(&path, "[server]\nport = 8001\n").unwrap();

        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.server().port, 8001);

        let before = store.snapshot();
        std::fs::write(&path, "[server]\nport = 8002\n").unwrap();
        store.reload().unwrap();

        assert_eq!(store.server().port, 8002);
        // The old snapshot is still intact for holders.
        assert_eq!(before.server.port, 8001);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn failed_reload_retains_previous_snapshot() {
        let path = scratch_path("reload-bad.toml");
        std::fs::write(&path, "[server]\nport = 8001\n").unwrap();

        let store = ConfigStore::open(&path).unwrap();
        std::fs::write(&path, "[server]\nthreads = 9999\n").unwrap();

        assert!(store.reload().is_err());
        assert_eq!(store.server().port, 8001);
        assert!(store.last_error().is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn watch_enable_disable_is_idempotent() {
        let path = scratch_path("watch.toml");
        std::fs::write(&path, "").unwrap();

        let store = ConfigStore::open(&path).unwrap();
        store.enable_watch(Duration::from_millis(50), None);
        store.enable_watch(Duration::from_millis(50), None);
        store.disable_watch();
        store.disable_watch();

        let _ = std::fs::remove_file(&path);
    }
}

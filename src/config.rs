//! Configuration loading and types for the gateway.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct. Each subsection governs a different part of the
//! system: the gateway listener, the admin listener, the worker runtime,
//! the backend store, the lock-coordination store, logging, and
//! observability.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Gateway HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Admin HTTP listener settings.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Worker runtime settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Backend store settings.
    #[serde(default)]
    pub backend: BackendSettings,

    /// Lock-coordination store settings.
    #[serde(default)]
    pub lock_registry: LockRegistryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Gateway HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_ip")]
    pub ip: String,

    /// Bind port for the S3-facing gateway.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
        }
    }
}

/// Admin HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bind port for the admin (user-management) surface (spec §4.8).
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            port: default_admin_port(),
        }
    }
}

/// Worker runtime configuration (spec §2.7, §5).
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker (blocking-pool) threads. Clamped to 100 per
    /// spec §5's stated ceiling.
    #[serde(default = "default_worker_num")]
    pub worker_num: u32,
}

impl WorkerConfig {
    /// `worker_num`, clamped to the spec's 100-worker ceiling.
    pub fn clamped_worker_num(&self) -> u32 {
        self.worker_num.min(100).max(1)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_num: default_worker_num(),
        }
    }
}

/// Backend store connection settings, threaded into
/// [`crate::backend::BackendConfig`] even though the bundled in-memory
/// backend ignores their values (see SPEC_FULL.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    /// `zp_meta_ip_ports` — metadata/table-store endpoint(s).
    #[serde(default = "default_meta_ip_ports")]
    pub zp_meta_ip_ports: String,

    /// `zp_table_name` — namespace/table name.
    #[serde(default = "default_table_name")]
    pub zp_table_name: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            zp_meta_ip_ports: default_meta_ip_ports(),
            zp_table_name: default_table_name(),
        }
    }
}

/// Lock-coordination store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LockRegistryConfig {
    /// `redis_ip_port` — coordination store endpoint.
    #[serde(default = "default_redis_ip_port")]
    pub redis_ip_port: String,

    /// `redis_passwd` — optional coordination-store credential.
    #[serde(default)]
    pub redis_passwd: String,

    /// Lock TTL in seconds.
    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,
}

impl Default for LockRegistryConfig {
    fn default() -> Self {
        Self {
            redis_ip_port: default_redis_ip_port(),
            redis_passwd: String::new(),
            lock_ttl_seconds: default_lock_ttl_seconds(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9012
}

fn default_admin_port() -> u16 {
    9013
}

fn default_worker_num() -> u32 {
    32
}

fn default_meta_ip_ports() -> String {
    "127.0.0.1:9221".to_string()
}

fn default_table_name() -> String {
    "s3gw".to_string()
}

fn default_redis_ip_port() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_lock_ttl_seconds() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_example_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 9012);
        assert_eq!(config.admin.port, 9013);
        assert_eq!(config.worker.clamped_worker_num(), 32);
        assert_eq!(config.lock_registry.lock_ttl_seconds, 10);
    }

    #[test]
    fn worker_num_is_clamped_to_one_hundred() {
        let worker = WorkerConfig { worker_num: 5_000 };
        assert_eq!(worker.clamped_worker_num(), 100);
    }

    #[test]
    fn worker_num_is_clamped_to_at_least_one() {
        let worker = WorkerConfig { worker_num: 0 };
        assert_eq!(worker.clamped_worker_num(), 1);
    }

    #[test]
    fn loads_yaml_matching_spec_shape() {
        let yaml = r#"
server:
  ip: "127.0.0.1"
  port: 9100
admin:
  port: 9101
worker:
  worker_num: 8
backend:
  zp_meta_ip_ports: "10.0.0.1:9221"
  zp_table_name: "mytable"
lock_registry:
  redis_ip_port: "10.0.0.2:6379"
  redis_passwd: "hunter2"
  lock_ttl_seconds: 20
logging:
  level: "debug"
  format: "json"
observability:
  metrics: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.ip, "127.0.0.1");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.admin.port, 9101);
        assert_eq!(config.worker.worker_num, 8);
        assert_eq!(config.backend.zp_table_name, "mytable");
        assert_eq!(config.lock_registry.lock_ttl_seconds, 20);
        assert!(!config.observability.metrics);
    }
}

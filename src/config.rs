//! Configuration loading and types for filedash.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section has defaults, so an empty file (or
//! no file at all) yields a working in-memory setup.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Whose namespace the dashboard operates on.
    #[serde(default)]
    pub owner: OwnerConfig,

    /// Remote object store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// File sync controller settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Todo board settings.
    #[serde(default)]
    pub todos: TodoConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Owner identity.  Authentication happens elsewhere; this only names the
/// namespace.
#[derive(Debug, Clone, Deserialize)]
pub struct OwnerConfig {
    #[serde(default = "default_owner_id")]
    pub id: String,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            id: default_owner_id(),
        }
    }
}

/// Object store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `memory`, `local`, `s3`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Local filesystem store configuration.
    #[serde(default)]
    pub local: LocalStoreConfig,

    /// S3 store configuration.
    #[serde(default)]
    pub s3: Option<S3StoreConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStoreConfig::default(),
            s3: None,
        }
    }
}

/// Local filesystem store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalStoreConfig {
    /// Root directory for stored objects.
    #[serde(default = "default_storage_root")]
    pub root_dir: String,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// S3 store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct S3StoreConfig {
    /// Bucket holding every owner's objects.
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Key prefix in the bucket (e.g. `private/`).
    #[serde(default)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
    /// Lifetime of presigned access URLs.
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_seconds: u64,
    /// Uploads larger than this use multipart upload.
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: u64,
    /// Multipart part size (raised to the S3 minimum of 5 MiB).
    #[serde(default = "default_part_size")]
    pub part_size_bytes: u64,
}

/// File sync controller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// How many recent diagnostics the controller retains.
    #[serde(default = "default_diagnostics_capacity")]
    pub diagnostics_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            diagnostics_capacity: default_diagnostics_capacity(),
        }
    }
}

/// Todo board configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoConfig {
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

/// SQLite-specific todo configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file (`:memory:` for a throwaway board).
    #[serde(default = "default_todo_path")]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_todo_path(),
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
    /// Enable Prometheus metrics collection.
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

fn default_owner_id() -> String {
    "local-user".to_string()
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_storage_root() -> String {
    "./data/objects".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presign_ttl() -> u64 {
    900
}

fn default_multipart_threshold() -> u64 {
    16 * 1024 * 1024
}

fn default_part_size() -> u64 {
    8 * 1024 * 1024
}

fn default_diagnostics_capacity() -> usize {
    32
}

fn default_todo_path() -> String {
    "./data/todos.db".to_string()
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
    parse_config(&contents)
}

/// Parse configuration from YAML text.  An empty document yields defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.owner.id, "local-user");
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.sync.diagnostics_capacity, 32);
        assert_eq!(config.logging.format, "text");
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_s3_section_defaults() {
        let yaml = r#"
owner:
  id: u1
storage:
  backend: s3
  s3:
    bucket: dashboard-files
    prefix: private/
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.owner.id, "u1");
        let s3 = config.storage.s3.expect("s3 section");
        assert_eq!(s3.bucket, "dashboard-files");
        assert_eq!(s3.prefix, "private/");
        assert_eq!(s3.region, "us-east-1");
        assert_eq!(s3.presign_ttl_seconds, 900);
        assert!(!s3.use_path_style);
    }

    #[test]
    fn test_local_and_todo_sections() {
        let yaml = r#"
storage:
  backend: local
  local:
    root_dir: /tmp/files
todos:
  sqlite:
    path: ":memory:"
logging:
  level: debug
  format: json
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.storage.local.root_dir, "/tmp/files");
        assert_eq!(config.todos.sqlite.path, ":memory:");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(parse_config("storage: [unclosed").is_err());
    }
}

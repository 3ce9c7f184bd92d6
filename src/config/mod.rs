//! Configuration management.
//!
//! Configuration is layered, later layers overriding earlier ones:
//!
//! 1. built-in defaults ([`Config::default`])
//! 2. a TOML file (`--config`, `./sds-finder.toml`, or `<config dir>/sds-finder/config.toml`)
//! 3. environment variables prefixed with `SDS_FINDER`, using `__` between keys
//!
//! # Configuration File Format
//!
//! ```toml
//! [http]
//! request_timeout_secs = 20
//!
//! [resolver]
//! adapter_timeout_secs = 45
//! identifier_timeout_secs = 120
//! batch_timeout_secs = 600
//! worker_pool_size = 5
//!
//! [resolver.fan_out]
//! cas = "concurrent"
//! name = "sequential"
//!
//! [sources]
//! by_cas = ["chemblink", "vwr", "fisher", "tci", "chemical_safety", "fluorochem"]
//! disabled = ["vwr"]
//!
//! [downloads]
//! root_dir = "/var/tmp/sds_downloads"
//! max_file_size_mb = 50
//!
//! [cleanup]
//! max_age_secs = 86400
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::IdentifierKind;
use crate::utils::RetryConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SDS_FINDER";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Outbound HTTP settings shared by every source
    #[serde(default)]
    pub http: HttpConfig,

    /// Scheduling and timeout policy
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Provider order and enablement
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Download settings
    #[serde(default)]
    pub downloads: DownloadConfig,

    /// Cleanup of materialized request directories
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Render as TOML (used by `config init`)
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User agent sent to providers; several sites reject non-browser agents
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound for a single HTTP request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36".to_string()
}

fn default_request_timeout() -> u64 {
    20
}

fn default_connect_timeout() -> u64 {
    10
}

/// How the providers for one identifier are polled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    /// One provider at a time, in priority order
    Sequential,
    /// All providers at once; the highest-priority hit still wins
    Concurrent,
}

/// Fan-out policy table, one entry per lookup kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// CAS lookups are cheap index hits
    #[serde(default = "default_cas_fan_out")]
    pub cas: FanOut,

    /// Keyword searches are expensive for the providers, never run them in parallel
    #[serde(default = "default_name_fan_out")]
    pub name: FanOut,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            cas: default_cas_fan_out(),
            name: default_name_fan_out(),
        }
    }
}

impl FanOutConfig {
    pub fn for_kind(&self, kind: IdentifierKind) -> FanOut {
        match kind {
            IdentifierKind::Cas => self.cas,
            IdentifierKind::Name => self.name,
        }
    }
}

fn default_cas_fan_out() -> FanOut {
    FanOut::Concurrent
}

fn default_name_fan_out() -> FanOut {
    FanOut::Sequential
}

/// Resolver scheduling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Bound on one provider invocation (may span several HTTP requests)
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,

    /// Total budget for resolving one identifier across all providers
    #[serde(default = "default_identifier_timeout")]
    pub identifier_timeout_secs: u64,

    /// Deadline for the whole batch
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Identifiers resolved in parallel
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default)]
    pub fan_out: FanOutConfig,

    /// Retries of transient provider failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: default_adapter_timeout(),
            identifier_timeout_secs: default_identifier_timeout(),
            batch_timeout_secs: default_batch_timeout(),
            worker_pool_size: default_worker_pool_size(),
            fan_out: FanOutConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResolverConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    pub fn identifier_timeout(&self) -> Duration {
        Duration::from_secs(self.identifier_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

fn default_adapter_timeout() -> u64 {
    45
}

fn default_identifier_timeout() -> u64 {
    120
}

fn default_batch_timeout() -> u64 {
    600
}

fn default_worker_pool_size() -> usize {
    5
}

/// Provider order configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Provider priority for CAS lookups
    #[serde(default = "default_cas_order")]
    pub by_cas: Vec<String>,

    /// Provider priority for product-name lookups
    #[serde(default = "default_name_order")]
    pub by_name: Vec<String>,

    /// Providers never consulted
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            by_cas: default_cas_order(),
            by_name: default_name_order(),
            disabled: Vec::new(),
        }
    }
}

fn default_cas_order() -> Vec<String> {
    ["chemblink", "vwr", "fisher", "tci", "chemical_safety", "fluorochem"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_name_order() -> Vec<String> {
    ["chemical_safety", "vwr", "fisher", "tci", "chemblink", "fluorochem"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Download configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root under which one directory per request id is created
    #[serde(default = "default_download_dir")]
    pub root_dir: PathBuf,

    /// Maximum file size for downloads (in MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size_mb: u64,

    /// Bound on one document download
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root_dir: default_download_dir(),
            max_file_size_mb: default_max_file_size(),
            timeout_secs: default_download_timeout(),
        }
    }
}

impl DownloadConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("sds_downloads")
}

fn default_max_file_size() -> u64 {
    50
}

fn default_download_timeout() -> u64 {
    30
}

/// Cleanup configuration for request directories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Request directories older than this are removed
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// Keep at most this many request directories (newest first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_request_dirs: Option<usize>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            max_age_secs: default_max_age(),
            max_request_dirs: None,
        }
    }
}

impl CleanupConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_max_age() -> u64 {
    24 * 3600
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `"json"` for structured output, plain text otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locate a configuration file in the usual places
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("sds-finder.toml");
    if local.is_file() {
        return Some(local);
    }

    dirs::config_dir()
        .map(|dir| dir.join("sds-finder").join("config.toml"))
        .filter(|path| path.is_file())
}

/// Load configuration from defaults, an optional file and the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

    match path {
        Some(path) => builder = builder.add_source(config::File::from(path)),
        None => {
            if let Some(found) = find_config_file() {
                tracing::debug!("Using configuration file {}", found.display());
                builder = builder.add_source(config::File::from(found.as_path()).required(false));
            }
        }
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("sources.by_cas")
                .with_list_parse_key("sources.by_name")
                .with_list_parse_key("sources.disabled"),
        )
        .build()?;

    settings.try_deserialize()
}

/// Get the default configuration
pub fn get_config() -> Config {
    Config::default()
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MemlinkError, Result};

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "MEMLINK_";

/// Main configuration structure for memlink
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Remote service address and credentials
    #[serde(default)]
    pub client: ClientConfig,
    /// HTTP timeouts
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Connection pool limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Payload chunking
    #[serde(default)]
    pub data: DataConfig,
    /// Health checking and rebuild behaviour
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL of the memory service
    #[serde(default = "default_host")]
    pub host: String,
    /// Organization scope merged into request parameters
    #[serde(default)]
    pub org_id: Option<String>,
    /// Project scope merged into request parameters
    #[serde(default)]
    pub project_id: Option<String>,
    /// Scheme placed before the key in the Authorization header
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            host: default_host(),
            org_id: None,
            project_id: None,
            auth_scheme: default_auth_scheme(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_host() -> String {
    "https://api.mem0.ai".to_string()
}

fn default_auth_scheme() -> String {
    "Token".to_string()
}

fn default_user_agent() -> String {
    concat!("memlink/", env!("CARGO_PKG_VERSION")).to_string()
}

/// HTTP timeout configuration, in seconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Time allowed to establish a connection
    #[serde(default = "default_connect_secs")]
    pub connect_secs: f64,
    /// Time allowed between reads of the response
    #[serde(default = "default_read_secs")]
    pub read_secs: f64,
    /// Time allowed to upload the request body
    #[serde(default = "default_write_secs")]
    pub write_secs: f64,
    /// Time allowed to wait for a free connection slot
    #[serde(default = "default_pool_secs")]
    pub pool_secs: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            read_secs: default_read_secs(),
            write_secs: default_write_secs(),
            pool_secs: default_pool_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        secs(self.write_secs)
    }

    pub fn pool(&self) -> Duration {
        secs(self.pool_secs)
    }
}

fn default_connect_secs() -> f64 {
    30.0
}

fn default_read_secs() -> f64 {
    600.0
}

fn default_write_secs() -> f64 {
    300.0
}

fn default_pool_secs() -> f64 {
    30.0
}

/// Connection pool limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum concurrent requests per transport handle
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum idle keep-alive connections kept in the pool
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,
    /// Seconds before an idle connection is dropped
    #[serde(default = "default_idle_expiry_secs")]
    pub idle_expiry_secs: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_idle_connections: default_max_idle_connections(),
            idle_expiry_secs: default_idle_expiry_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn idle_expiry(&self) -> Duration {
        secs(self.idle_expiry_secs)
    }
}

fn default_max_connections() -> usize {
    200
}

fn default_max_idle_connections() -> usize {
    50
}

fn default_idle_expiry_secs() -> f64 {
    30.0
}

/// Retry policy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts per operation (including the first)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in seconds
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,
    /// Multiplier applied to the delay after each failed attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_secs() -> f64 {
    2.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

/// Payload chunking configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Serialized payloads above this many bytes take the chunked path
    #[serde(default = "default_soft_chunk_threshold")]
    pub soft_chunk_threshold: usize,
    /// Upper bound in bytes for a single chunk's content
    #[serde(default = "default_hard_chunk_cap")]
    pub hard_chunk_cap: usize,
    /// Pause between consecutive chunk uploads, in seconds
    #[serde(default = "default_inter_chunk_delay_secs")]
    pub inter_chunk_delay_secs: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            soft_chunk_threshold: default_soft_chunk_threshold(),
            hard_chunk_cap: default_hard_chunk_cap(),
            inter_chunk_delay_secs: default_inter_chunk_delay_secs(),
        }
    }
}

impl DataConfig {
    pub fn inter_chunk_delay(&self) -> Duration {
        secs(self.inter_chunk_delay_secs)
    }
}

fn default_soft_chunk_threshold() -> usize {
    1024 * 1024
}

fn default_hard_chunk_cap() -> usize {
    2 * 1024 * 1024
}

fn default_inter_chunk_delay_secs() -> f64 {
    0.1
}

/// Connection health configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Seconds after which the connection is considered stale and re-probed
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: f64,
    /// Seconds between health monitor wake-ups
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: f64,
    /// Rebuild the transport automatically on failure
    #[serde(default = "default_auto_rebuild")]
    pub auto_rebuild: bool,
    /// Timeout for liveness probes and credential checks
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: default_health_check_interval_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            auto_rebuild: default_auto_rebuild(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl ConnectionConfig {
    pub fn health_check_interval(&self) -> Duration {
        secs(self.health_check_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        secs(self.heartbeat_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        secs(self.probe_timeout_secs)
    }
}

fn default_health_check_interval_secs() -> f64 {
    30.0
}

fn default_heartbeat_interval_secs() -> f64 {
    60.0
}

fn default_auto_rebuild() -> bool {
    true
}

fn default_probe_timeout_secs() -> f64 {
    10.0
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Append logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

type Setter = fn(&mut Config, &str, &str) -> Result<()>;

impl Config {
    /// Load, overlay the environment, and validate in one step.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or from the first default location that
    /// exists, falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Candidate config file locations, in lookup order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".memlink").join("config.toml")),
            dirs::config_dir().map(|c| c.join("memlink").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MemlinkError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MemlinkError::Config(format!("Failed to parse config: {e}")))
    }

    /// Overlay `MEMLINK_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Overlay `MEMLINK_*` variables resolved through `lookup`
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let setters: [(&str, Setter); 22] = [
            ("API_KEY", |c, _, v| {
                c.client.api_key = Some(v.to_string());
                Ok(())
            }),
            ("HOST", |c, _, v| {
                c.client.host = v.to_string();
                Ok(())
            }),
            ("ORG_ID", |c, _, v| {
                c.client.org_id = Some(v.to_string());
                Ok(())
            }),
            ("PROJECT_ID", |c, _, v| {
                c.client.project_id = Some(v.to_string());
                Ok(())
            }),
            ("TIMEOUT", |c, n, v| {
                c.timeout.read_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("CONNECT_TIMEOUT", |c, n, v| {
                c.timeout.connect_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("WRITE_TIMEOUT", |c, n, v| {
                c.timeout.write_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("POOL_TIMEOUT", |c, n, v| {
                c.timeout.pool_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("MAX_CONNECTIONS", |c, n, v| {
                c.limits.max_connections = parse_int(n, v)?;
                Ok(())
            }),
            ("MAX_IDLE_CONNECTIONS", |c, n, v| {
                c.limits.max_idle_connections = parse_int(n, v)?;
                Ok(())
            }),
            ("IDLE_EXPIRY", |c, n, v| {
                c.limits.idle_expiry_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("MAX_RETRIES", |c, n, v| {
                c.retry.max_retries = parse_int(n, v)?;
                Ok(())
            }),
            ("RETRY_DELAY", |c, n, v| {
                c.retry.initial_delay_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("BACKOFF_FACTOR", |c, n, v| {
                c.retry.backoff_factor = parse_float(n, v)?;
                Ok(())
            }),
            ("CHUNK_SIZE", |c, n, v| {
                c.data.soft_chunk_threshold = parse_int(n, v)?;
                Ok(())
            }),
            ("MAX_CHUNK_SIZE", |c, n, v| {
                c.data.hard_chunk_cap = parse_int(n, v)?;
                Ok(())
            }),
            ("CHUNK_DELAY", |c, n, v| {
                c.data.inter_chunk_delay_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("HEALTH_CHECK_INTERVAL", |c, n, v| {
                c.connection.health_check_interval_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("HEARTBEAT_INTERVAL", |c, n, v| {
                c.connection.heartbeat_interval_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("AUTO_REBUILD", |c, n, v| {
                c.connection.auto_rebuild = parse_bool(n, v)?;
                Ok(())
            }),
            ("PROBE_TIMEOUT", |c, n, v| {
                c.connection.probe_timeout_secs = parse_float(n, v)?;
                Ok(())
            }),
            ("LOG_LEVEL", |c, _, v| {
                c.logging.level = v.to_string();
                Ok(())
            }),
        ];

        for (suffix, set) in setters {
            let name = format!("{ENV_PREFIX}{suffix}");
            if let Some(raw) = lookup(&name) {
                set(self, &name, raw.trim())?;
            }
        }

        // An empty value switches file logging off
        let log_file = format!("{ENV_PREFIX}LOG_FILE");
        if let Some(raw) = lookup(&log_file) {
            let raw = raw.trim();
            self.logging.file = (!raw.is_empty()).then(|| PathBuf::from(raw));
        }

        Ok(())
    }

    /// Check the invariants every component relies on
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("timeout.connect_secs", self.timeout.connect_secs),
            ("timeout.read_secs", self.timeout.read_secs),
            ("timeout.write_secs", self.timeout.write_secs),
            ("timeout.pool_secs", self.timeout.pool_secs),
            ("limits.idle_expiry_secs", self.limits.idle_expiry_secs),
            ("retry.initial_delay_secs", self.retry.initial_delay_secs),
            ("data.inter_chunk_delay_secs", self.data.inter_chunk_delay_secs),
            (
                "connection.health_check_interval_secs",
                self.connection.health_check_interval_secs,
            ),
            (
                "connection.heartbeat_interval_secs",
                self.connection.heartbeat_interval_secs,
            ),
            (
                "connection.probe_timeout_secs",
                self.connection.probe_timeout_secs,
            ),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(MemlinkError::Config(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }

        if self.connection.heartbeat_interval_secs == 0.0 {
            return Err(MemlinkError::Config(
                "connection.heartbeat_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_retries < 1 {
            return Err(MemlinkError::Config(
                "retry.max_retries must be at least 1".to_string(),
            ));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 0.0 {
            return Err(MemlinkError::Config(format!(
                "retry.backoff_factor must be non-negative, got {}",
                self.retry.backoff_factor
            )));
        }
        if self.limits.max_connections < 1 {
            return Err(MemlinkError::Config(
                "limits.max_connections must be at least 1".to_string(),
            ));
        }
        if self.data.hard_chunk_cap < self.data.soft_chunk_threshold {
            return Err(MemlinkError::Config(format!(
                "data.hard_chunk_cap ({}) must not be smaller than data.soft_chunk_threshold ({})",
                self.data.hard_chunk_cap, self.data.soft_chunk_threshold
            )));
        }
        if self.data.hard_chunk_cap < 4 {
            return Err(MemlinkError::Config(
                "data.hard_chunk_cap must be at least 4 bytes".to_string(),
            ));
        }
        url::Url::parse(&self.client.host).map_err(|e| {
            MemlinkError::Config(format!("Invalid host '{}': {e}", self.client.host))
        })?;

        Ok(())
    }
}

fn parse_float(name: &str, raw: &str) -> Result<f64> {
    raw.parse()
        .map_err(|_| MemlinkError::Config(format!("{name} must be a number, got '{raw}'")))
}

fn parse_int<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| MemlinkError::Config(format!("{name} must be an integer, got '{raw}'")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(MemlinkError::Config(format!(
            "{name} must be a boolean, got '{raw}'"
        ))),
    }
}

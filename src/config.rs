use crate::error::{InfluxError, Result};
use crate::types::{Consistency, Precision};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "INFLUX_";

/// Retention policy used when none is configured
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";

/// Retention duration used when none is configured ("0" keeps data forever)
pub const DEFAULT_RETENTION_DURATION: &str = "0";

const REDACTED: &str = "[protected]";

/// Host-facing connection properties, as read from YAML or the environment.
///
/// These are raw values. Call [`ConnectionConfig::try_from`] to get the normalized,
/// immutable configuration the client works with.
#[derive(Clone, Serialize, Deserialize)]
pub struct InfluxProperties {
    /// Store endpoint, e.g. `http://localhost:8086`
    #[serde(default = "default_open_url")]
    pub open_url: String,

    /// User name
    #[serde(default)]
    pub username: Option<String>,

    /// Password
    #[serde(default)]
    pub password: Option<String>,

    /// Database name
    #[serde(default)]
    pub database: String,

    /// Retention policy name
    #[serde(default)]
    pub retention_policy: Option<String>,

    /// Retention duration literal such as `2h`, `30d`
    #[serde(default)]
    pub retention_policy_time: Option<String>,

    /// Degrade to a no-op client instead of failing when the store is unreachable
    #[serde(default)]
    pub skip_error: bool,

    /// Provision the configured retention policy while connecting
    #[serde(default = "default_provision_retention_policy")]
    pub provision_retention_policy: bool,

    /// Transport timeout in seconds
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    /// Options applied by `enable_batch(None)`
    #[serde(default)]
    pub batch: BatchOptions,
}

impl Default for InfluxProperties {
    fn default() -> Self {
        Self {
            open_url: default_open_url(),
            username: None,
            password: None,
            database: String::new(),
            retention_policy: None,
            retention_policy_time: None,
            skip_error: false,
            provision_retention_policy: default_provision_retention_policy(),
            timeout_sec: default_timeout_sec(),
            batch: BatchOptions::default(),
        }
    }
}

impl fmt::Debug for InfluxProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxProperties")
            .field("open_url", &self.open_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("database", &self.database)
            .field("retention_policy", &self.retention_policy)
            .field("retention_policy_time", &self.retention_policy_time)
            .field("skip_error", &self.skip_error)
            .finish_non_exhaustive()
    }
}

impl InfluxProperties {
    /// Properties pointing at `database` on a local store
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Load properties from YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| InfluxError::ConfigError(e.to_string()))?;

        Self::from_yaml(&contents)
    }

    /// Load properties from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let properties: InfluxProperties = serde_yaml::from_str(yaml)?;
        Ok(properties)
    }

    /// Apply `INFLUX_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(&ProcessEnv)
    }

    /// Apply `INFLUX_*` overrides from an arbitrary source. Overrides win over file values.
    pub fn apply_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        if let Some(url) = env.get("URL") {
            self.open_url = url;
        }
        if let Some(username) = env.get("USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = env.get("PASSWORD") {
            self.password = Some(password);
        }
        if let Some(database) = env.get("DATABASE") {
            self.database = database;
        }
        if let Some(policy) = env.get("RETENTION_POLICY") {
            self.retention_policy = Some(policy);
        }
        if let Some(duration) = env.get("RETENTION_POLICY_TIME") {
            self.retention_policy_time = Some(duration);
        }
        if let Some(raw) = env.get("SKIP_ERROR") {
            self.skip_error = parse_bool("SKIP_ERROR", &raw)?;
        }
        if let Some(raw) = env.get("TIMEOUT_SEC") {
            self.timeout_sec = raw.trim().parse().map_err(|_| {
                InfluxError::ConfigError(format!(
                    "{}TIMEOUT_SEC must be a whole number of seconds, got {:?}",
                    ENV_PREFIX, raw
                ))
            })?;
        }
        Ok(())
    }
}

/// Source of environment overrides, so tests can supply their own values
pub trait EnvSource {
    /// Look up a key without the `INFLUX_` prefix
    fn get(&self, key: &str) -> Option<String>;
}

struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", ENV_PREFIX, key))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(InfluxError::ConfigError(format!(
            "{}{} must be a boolean, got {:?}",
            ENV_PREFIX, key, other
        ))),
    }
}

/// Normalized, immutable connection configuration
#[derive(Clone)]
pub struct ConnectionConfig {
    url: String,
    username: Option<String>,
    password: Option<String>,
    database: String,
    retention_policy: String,
    retention_policy_time: String,
    skip_error: bool,
    provision_retention_policy: bool,
    timeout: Duration,
    batch: BatchOptions,
}

impl TryFrom<InfluxProperties> for ConnectionConfig {
    type Error = InfluxError;

    fn try_from(properties: InfluxProperties) -> Result<Self> {
        let url = properties.open_url.trim();
        let url = url.strip_suffix('/').unwrap_or(url).to_string();
        if url.is_empty() {
            return Err(InfluxError::ConfigError("open_url must not be empty".to_string()));
        }

        let database = properties.database.trim().to_string();
        if database.is_empty() {
            return Err(InfluxError::ConfigError("database must not be empty".to_string()));
        }

        let retention_policy = properties
            .retention_policy
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RETENTION_POLICY.to_string());
        let retention_policy_time = properties
            .retention_policy_time
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RETENTION_DURATION.to_string());

        if properties.timeout_sec == 0 {
            return Err(InfluxError::ConfigError("timeout_sec must be at least 1".to_string()));
        }

        Ok(Self {
            url,
            username: properties.username.filter(|u| !u.is_empty()),
            password: properties.password.filter(|p| !p.is_empty()),
            database,
            retention_policy,
            retention_policy_time,
            skip_error: properties.skip_error,
            provision_retention_policy: properties.provision_retention_policy,
            timeout: Duration::from_secs(properties.timeout_sec),
            batch: properties.batch,
        })
    }
}

impl ConnectionConfig {
    /// Endpoint URL without trailing slash
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn retention_policy(&self) -> &str {
        &self.retention_policy
    }

    pub fn retention_policy_time(&self) -> &str {
        &self.retention_policy_time
    }

    pub fn skip_error(&self) -> bool {
        self.skip_error
    }

    pub fn provision_retention_policy(&self) -> bool {
        self.provision_retention_policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn batch_options(&self) -> &BatchOptions {
        &self.batch
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("database", &self.database)
            .field("retention_policy", &self.retention_policy)
            .field("retention_policy_time", &self.retention_policy_time)
            .field("skip_error", &self.skip_error)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionConfig(url={}, username={}, password={}, database={}, retentionPolicy={}, retentionPolicyTime={}, skipError={})",
            self.url,
            self.username.as_deref().unwrap_or(""),
            REDACTED,
            self.database,
            self.retention_policy,
            self.retention_policy_time,
            self.skip_error
        )
    }
}

/// What the batch processor does when its buffer is full
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BufferFullAction {
    /// Evict the oldest buffered point to make room
    #[default]
    DropOldest,
    /// Discard the incoming point
    DropNewest,
}

/// Buffered write settings for batch mode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchOptions {
    /// Points collected before an immediate flush
    #[serde(default = "default_actions")]
    pub actions: usize,

    /// Maximum linger time in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Maximum buffered points
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,

    #[serde(default)]
    pub on_buffer_full: BufferFullAction,

    #[serde(default = "default_batch_consistency")]
    pub consistency: Consistency,

    #[serde(default)]
    pub precision: Precision,
}

impl BatchOptions {
    /// Get flush interval as Duration
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn with_actions(mut self, actions: usize) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = limit;
        self
    }

    pub fn with_buffer_full_action(mut self, action: BufferFullAction) -> Self {
        self.on_buffer_full = action;
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            actions: default_actions(),
            flush_interval_ms: default_flush_interval_ms(),
            buffer_limit: default_buffer_limit(),
            on_buffer_full: BufferFullAction::default(),
            consistency: default_batch_consistency(),
            precision: Precision::default(),
        }
    }
}

// Default value functions
fn default_open_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_provision_retention_policy() -> bool {
    true
}

fn default_timeout_sec() -> u64 {
    30
}

fn default_actions() -> usize {
    1000
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_buffer_limit() -> usize {
    10000
}

fn default_batch_consistency() -> Consistency {
    Consistency::One
}

//! Configuration for the replicator.
//!
//! This module defines all configuration types needed to run a pass.
//! Configuration is loaded once, validated, and then passed by value into
//! [`ReplicationEngine::new()`](crate::ReplicationEngine::new). Nothing is
//! read from process-wide state afterwards.
//!
//! # Quick Start
//!
//! ```rust
//! use doc_replicator::config::ReplicationConfig;
//!
//! let config = ReplicationConfig::for_testing(
//!     "mongodb://localhost:27011",
//!     &["mongodb://localhost:27019", "mongodb://localhost:27020"],
//! );
//! assert!(config.validate().is_ok());
//! assert_eq!(config.destination_database(), "sales");
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── source: SourceConfig              # Authoritative database
//! ├── destinations: Vec<DestinationConfig>
//! ├── destination_database: Option      # Defaults to source.database
//! └── settings: SyncSettings
//!     ├── materialize_threshold         # Strategy boundary (documents)
//!     ├── reserved_prefix               # Never-synced collection prefix
//!     ├── max_concurrent_destinations   # Worker bound
//!     ├── forced_strategy               # Optional override
//!     └── connect: ConnectConfig        # Startup connect retry
//! ```
//!
//! # TOML Example
//!
//! ```toml
//! [source]
//! uri = "mongodb://localhost:27011"
//! database = "sales"
//!
//! [[destinations]]
//! uri = "mongodb://localhost:27019"
//! name = "replica-a"
//!
//! [[destinations]]
//! uri = "mongodb://localhost:27020"
//!
//! [settings]
//! materialize_threshold = 200000
//! max_concurrent_destinations = 4
//!
//! [settings.connect]
//! timeout = "10s"
//! max_attempts = 5
//! ```

use crate::connection::redact_uri;
use crate::error::{ReplicationError, Result};
use crate::resilience::RetryConfig;
use crate::store::DEFAULT_RESERVED_PREFIX;
use crate::strategy::{Strategy, StrategyPolicy, DEFAULT_MATERIALIZE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::path::Path;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config: loaded by the binary, handed to the engine
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object.
///
/// # Fields
///
/// - `source`: The database every destination is converged toward.
/// - `destinations`: Independent replica addresses.
/// - `destination_database`: Database name used on every destination.
/// - `settings`: Strategy, concurrency and connect tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// The authoritative database.
    pub source: SourceConfig,

    /// Replica addresses. Each one is synced independently.
    pub destinations: Vec<DestinationConfig>,

    /// Database name on the destinations.
    /// The same name is used on every destination; defaults to the source database.
    #[serde(default)]
    pub destination_database: Option<String>,

    /// Tunable parameters.
    #[serde(default)]
    pub settings: SyncSettings,
}

impl ReplicationConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ReplicationError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Create a minimal config for testing (database `sales`).
    pub fn for_testing(source_uri: &str, destination_uris: &[&str]) -> Self {
        Self {
            source: SourceConfig {
                uri: source_uri.to_string(),
                database: "sales".to_string(),
            },
            destinations: destination_uris
                .iter()
                .map(|uri| DestinationConfig::for_testing(uri))
                .collect(),
            destination_database: None,
            settings: SyncSettings::default(),
        }
    }

    /// The database name to use on every destination.
    pub fn destination_database(&self) -> &str {
        self.destination_database
            .as_deref()
            .unwrap_or(&self.source.database)
    }

    /// Check every constraint a run depends on.
    pub fn validate(&self) -> Result<()> {
        if self.source.uri.trim().is_empty() {
            return Err(ReplicationError::Config("source.uri is empty".to_string()));
        }
        if self.source.database.trim().is_empty() {
            return Err(ReplicationError::Config("source.database is empty".to_string()));
        }
        if self.destinations.is_empty() {
            return Err(ReplicationError::Config(
                "at least one destination is required".to_string(),
            ));
        }
        for (index, destination) in self.destinations.iter().enumerate() {
            if destination.uri.trim().is_empty() {
                return Err(ReplicationError::Config(format!(
                    "destinations[{}].uri is empty",
                    index
                )));
            }
        }
        if self.destination_database().trim().is_empty() {
            return Err(ReplicationError::Config(
                "destination_database is empty".to_string(),
            ));
        }
        self.settings.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Endpoints
// ═══════════════════════════════════════════════════════════════════════════════

/// The source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Connection string, e.g. `"mongodb://localhost:27011"`.
    pub uri: String,

    /// Database to replicate.
    pub database: String,
}

/// One destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Connection string.
    pub uri: String,

    /// Optional: Name used in logs and reports instead of the address.
    #[serde(default)]
    pub name: Option<String>,
}

impl DestinationConfig {
    /// Name for logs: the configured name, or the address without credentials.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| redact_uri(&self.uri))
    }

    /// Create a destination config for testing.
    pub fn for_testing(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            name: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SyncSettings: strategy and concurrency
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings that shape a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Collections with at most this many source documents are materialized;
    /// larger ones are streamed.
    #[serde(default = "default_materialize_threshold")]
    pub materialize_threshold: u64,

    /// Collections whose name starts with this prefix are never synced.
    #[serde(default = "default_reserved_prefix")]
    pub reserved_prefix: String,

    /// Maximum destinations processed at the same time.
    #[serde(default = "default_max_concurrent_destinations")]
    pub max_concurrent_destinations: usize,

    /// Optional: Use this strategy for every collection, whatever its size.
    #[serde(default)]
    pub forced_strategy: Option<Strategy>,

    /// Startup connection behavior.
    #[serde(default)]
    pub connect: ConnectConfig,
}

fn default_materialize_threshold() -> u64 {
    DEFAULT_MATERIALIZE_THRESHOLD
}

fn default_reserved_prefix() -> String {
    DEFAULT_RESERVED_PREFIX.to_string()
}

fn default_max_concurrent_destinations() -> usize {
    4
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            materialize_threshold: DEFAULT_MATERIALIZE_THRESHOLD,
            reserved_prefix: DEFAULT_RESERVED_PREFIX.to_string(),
            max_concurrent_destinations: 4,
            forced_strategy: None,
            connect: ConnectConfig::default(),
        }
    }
}

impl SyncSettings {
    /// Settings with a custom threshold, for tests around the strategy boundary.
    pub fn with_threshold(threshold: u64) -> Self {
        Self {
            materialize_threshold: threshold,
            ..Default::default()
        }
    }

    /// The strategy policy these settings describe.
    pub fn policy(&self) -> Result<StrategyPolicy> {
        let threshold = NonZeroU64::new(self.materialize_threshold).ok_or_else(|| {
            ReplicationError::Config("settings.materialize_threshold must be positive".to_string())
        })?;
        Ok(StrategyPolicy::new(threshold).with_forced(self.forced_strategy))
    }

    pub fn validate(&self) -> Result<()> {
        self.policy()?;
        if self.reserved_prefix.is_empty() {
            return Err(ReplicationError::Config(
                "settings.reserved_prefix is empty".to_string(),
            ));
        }
        if self.max_concurrent_destinations == 0 {
            return Err(ReplicationError::Config(
                "settings.max_concurrent_destinations must be positive".to_string(),
            ));
        }
        self.connect.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectConfig: startup connection retry
// ═══════════════════════════════════════════════════════════════════════════════

/// How hard to try before giving up on an address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Per-attempt timeout as a duration string (e.g., "10s").
    #[serde(default = "default_connect_timeout")]
    pub timeout: String,

    /// Attempts per address before it is reported unreachable.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

fn default_max_attempts() -> usize {
    5
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            timeout: "10s".to_string(),
            max_attempts: 5,
        }
    }
}

impl ConnectConfig {
    /// Parse the timeout string to a Duration.
    pub fn timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Retry profile for connecting at startup.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            attempt_timeout: self.timeout_duration(),
            ..RetryConfig::startup()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ReplicationError::Config(
                "settings.connect.max_attempts must be positive".to_string(),
            ));
        }
        humantime::parse_duration(&self.timeout).map_err(|e| {
            ReplicationError::Config(format!(
                "settings.connect.timeout {:?} is not a duration: {}",
                self.timeout, e
            ))
        })?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL: &str = r#"
destination_database = "sales_copy"

[source]
uri = "mongodb://localhost:27011"
database = "sales"

[[destinations]]
uri = "mongodb://localhost:27019"
name = "replica-a"

[[destinations]]
uri = "mongodb://admin:pw@localhost:27020"

[settings]
materialize_threshold = 5000
reserved_prefix = "sys_"
max_concurrent_destinations = 2
forced_strategy = "stream"

[settings.connect]
timeout = "750ms"
max_attempts = 2
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ReplicationConfig::from_toml_str(FULL).unwrap();

        assert_eq!(config.source.uri, "mongodb://localhost:27011");
        assert_eq!(config.source.database, "sales");
        assert_eq!(config.destination_database(), "sales_copy");
        assert_eq!(config.destinations.len(), 2);
        assert_eq!(config.destinations[0].label(), "replica-a");
        assert_eq!(config.destinations[1].label(), "mongodb://***@localhost:27020");
        assert_eq!(config.settings.materialize_threshold, 5000);
        assert_eq!(config.settings.reserved_prefix, "sys_");
        assert_eq!(config.settings.max_concurrent_destinations, 2);
        assert_eq!(config.settings.forced_strategy, Some(Strategy::Stream));
        assert_eq!(config.settings.connect.timeout_duration(), Duration::from_millis(750));
        assert_eq!(config.settings.connect.max_attempts, 2);
    }

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let config = ReplicationConfig::from_toml_str(
            r#"
[source]
uri = "mongodb://localhost:27011"
database = "AWS-Staging2"

[[destinations]]
uri = "mongodb://localhost:27019"
"#,
        )
        .unwrap();

        assert_eq!(config.destination_database(), "AWS-Staging2");
        assert_eq!(config.settings.materialize_threshold, 200_000);
        assert_eq!(config.settings.reserved_prefix, "system.");
        assert_eq!(config.settings.max_concurrent_destinations, 4);
        assert_eq!(config.settings.forced_strategy, None);
        assert_eq!(config.settings.connect.timeout_duration(), Duration::from_secs(10));
        assert_eq!(config.settings.connect.max_attempts, 5);
    }

    #[test]
    fn test_empty_destinations_rejected() {
        let result = ReplicationConfig::from_toml_str(
            r#"
destinations = []

[source]
uri = "mongodb://localhost:27011"
database = "sales"
"#,
        );
        assert!(
            matches!(result, Err(ReplicationError::Config(msg)) if msg.contains("destination"))
        );
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = ReplicationConfig::for_testing("mongodb://a", &["mongodb://b"]);
        config.settings.materialize_threshold = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("materialize_threshold"));
    }

    #[test]
    fn test_empty_database_names_rejected() {
        let mut config = ReplicationConfig::for_testing("mongodb://a", &["mongodb://b"]);
        config.source.database = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ReplicationConfig::for_testing("mongodb://a", &["mongodb://b"]);
        config.destination_database = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_uris_rejected() {
        let config = ReplicationConfig::for_testing("", &["mongodb://b"]);
        assert!(config.validate().is_err());

        let config = ReplicationConfig::for_testing("mongodb://a", &[""]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("destinations[0]"));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = SyncSettings::default();
        assert!(settings.validate().is_ok());

        settings.max_concurrent_destinations = 0;
        assert!(settings.validate().is_err());

        let mut settings = SyncSettings::default();
        settings.reserved_prefix = String::new();
        assert!(settings.validate().is_err());

        let mut settings = SyncSettings::default();
        settings.connect.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = SyncSettings::default();
        settings.connect.timeout = "soon".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_policy() {
        let policy = SyncSettings::with_threshold(10).policy().unwrap();
        assert_eq!(policy.threshold().get(), 10);
        assert_eq!(policy.choose(10), Strategy::Materialize);
        assert_eq!(policy.choose(11), Strategy::Stream);

        let mut settings = SyncSettings::with_threshold(10);
        settings.forced_strategy = Some(Strategy::Materialize);
        assert_eq!(settings.policy().unwrap().choose(1_000), Strategy::Materialize);
    }

    #[test]
    fn test_connect_timeout_various_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("500ms", Duration::from_millis(500)),
        ];

        for (input, expected) in test_cases {
            let config = ConnectConfig {
                timeout: input.to_string(),
                ..Default::default()
            };
            assert_eq!(config.timeout_duration(), expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_connect_timeout_invalid_fallback() {
        let config = ConnectConfig {
            timeout: "invalid".to_string(),
            ..Default::default()
        };
        assert_eq!(config.timeout_duration(), Duration::from_secs(10));
    }

    #[test]
    fn test_connect_retry_config() {
        let config = ConnectConfig {
            timeout: "2s".to_string(),
            max_attempts: 7,
        };
        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 7);
        assert_eq!(retry.attempt_timeout, Duration::from_secs(2));
        assert_eq!(retry.initial_delay, RetryConfig::startup().initial_delay);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();

        let config = ReplicationConfig::load(file.path()).unwrap();
        assert_eq!(config.destinations.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ReplicationConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ReplicationError::Config(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let err = ReplicationConfig::from_toml_str("[source\nuri=").unwrap_err();
        assert!(matches!(err, ReplicationError::Config(msg) if msg.contains("Invalid config")));
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = ReplicationConfig::from_toml_str(FULL).unwrap();

        let json = serde_json::to_string(&config).unwrap();
        let parsed: ReplicationConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.destinations[0].name.as_deref(), Some("replica-a"));
        assert_eq!(parsed.settings.forced_strategy, Some(Strategy::Stream));
    }
}

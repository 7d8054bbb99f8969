//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all engine settings.
//! Configuration is loaded from a TOML file; `GAMEBRIDGE_DATABASE` overrides
//! the database path. Provider secrets are never read from here.
//!
//! # Example
//!
//! ```no_run
//! use gamebridge::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::logging::LoggingConfig;
use crate::adapter::outbound::hub::DEFAULT_FEED_CAPACITY;
use crate::adapter::outbound::provider::ProviderConfig;
use crate::application::presence::DEFAULT_DEBOUNCE;
use crate::application::reaper::ReaperConfig;
use crate::application::reconcile::RetryPolicy;
use crate::application::signal::DEFAULT_CAPACITY as DEFAULT_SIGNAL_CAPACITY;
use crate::application::sync::ProviderSchedule;
use crate::domain::PartnerId;
use crate::error::{ConfigError, Result};

/// Environment variable that overrides [`Config::database`].
pub const DATABASE_ENV: &str = "GAMEBRIDGE_DATABASE";

/// Forced-logout debounce.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    u64::try_from(DEFAULT_DEBOUNCE.as_millis()).unwrap_or(1000)
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PresenceConfig {
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Channel sizes for the change feed and the window signal bus.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_capacity")]
    pub capacity: usize,
    #[serde(default = "default_signal_capacity")]
    pub signal_capacity: usize,
}

const fn default_feed_capacity() -> usize {
    DEFAULT_FEED_CAPACITY
}

const fn default_signal_capacity() -> usize {
    DEFAULT_SIGNAL_CAPACITY
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            capacity: default_feed_capacity(),
            signal_capacity: default_signal_capacity(),
        }
    }
}

/// Top-level partners whose provider history is pulled at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub partners: Vec<PartnerId>,
}

/// Main engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to SQLite database file.
    ///
    /// Defaults to "gamebridge.db" in the current directory.
    #[serde(default = "default_database_path")]
    pub database: String,

    /// Retry policy for provider balance calls during reconciliation.
    #[serde(default)]
    pub reconciler: RetryPolicy,

    #[serde(default)]
    pub presence: PresenceConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    /// One entry per game provider.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_database_path() -> String {
    "gamebridge.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            database: default_database_path(),
            reconciler: RetryPolicy::default(),
            presence: PresenceConfig::default(),
            reaper: ReaperConfig::default(),
            feed: FeedConfig::default(),
            sync: SyncConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        if let Ok(database) = std::env::var(DATABASE_ENV) {
            config.database = database;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Check that values are present and within range.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "database" }.into());
        }

        let retry = &self.reconciler;
        if retry.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be greater than 0"));
        }
        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(invalid("max_delay_ms", "must be >= initial_delay_ms"));
        }
        if retry.multiplier < 1.0 {
            return Err(invalid("multiplier", "must be >= 1.0"));
        }

        if self.presence.debounce_ms == 0 {
            return Err(invalid("debounce_ms", "must be greater than 0"));
        }

        self.reaper.validate()?;

        if self.feed.capacity == 0 {
            return Err(invalid("capacity", "must be greater than 0"));
        }
        if self.feed.signal_capacity == 0 {
            return Err(invalid("signal_capacity", "must be greater than 0"));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            validate_provider(provider)?;
            if !seen.insert(provider.id.clone()) {
                return Err(ConfigError::InvalidValue {
                    field: "providers",
                    reason: format!("duplicate provider '{}'", provider.id),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Sync cadence of every enabled provider.
    #[must_use]
    pub fn schedules(&self) -> Vec<ProviderSchedule> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| {
                ProviderSchedule::new(p.id.clone(), Duration::from_secs(p.sync_interval_secs))
            })
            .collect()
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

fn invalid(field: &'static str, reason: &str) -> crate::error::Error {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
    .into()
}

#[allow(clippy::result_large_err)]
fn validate_provider(provider: &ProviderConfig) -> Result<()> {
    if provider.id.as_str().is_empty() {
        return Err(ConfigError::MissingField { field: "providers.id" }.into());
    }
    let url = Url::parse(&provider.base_url).map_err(|e| ConfigError::InvalidValue {
        field: "providers.base_url",
        reason: format!("{}: {e}", provider.id),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            field: "providers.base_url",
            reason: format!("{}: scheme must be http or https", provider.id),
        }
        .into());
    }
    if provider.sync_interval_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "providers.sync_interval_secs",
            reason: format!("{}: must be greater than 0", provider.id),
        }
        .into());
    }
    if provider.http.timeout_ms == 0 || provider.http.connect_timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            field: "providers.http",
            reason: format!("{}: timeouts must be greater than 0", provider.id),
        }
        .into());
    }
    Ok(())
}

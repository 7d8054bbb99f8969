//! Game provider configuration.
//!
//! One `[[providers]]` table per provider. Secrets never live here; they are
//! held per partner in the credential records.

use serde::Deserialize;

use crate::domain::ProviderId;

/// Connection and cadence settings for a single provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Provider identifier as stored on sessions and credentials.
    pub id: ProviderId,
    /// Base URL of the provider API (e.g., `https://api.provider.example`).
    pub base_url: String,
    /// Path of the balance endpoint, relative to `base_url`.
    #[serde(default = "default_balance_path")]
    pub balance_path: String,
    /// Path of the settled history endpoint, relative to `base_url`.
    #[serde(default = "default_history_path")]
    pub history_path: String,
    /// Seconds between history pulls.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Whether the scheduler pulls history from this provider.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub http: ProviderHttpConfig,
}

fn default_balance_path() -> String {
    "/balance".into()
}

fn default_history_path() -> String {
    "/history".into()
}

const fn default_sync_interval_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Minimal config with default paths and cadence.
    pub fn new(id: impl Into<ProviderId>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            balance_path: default_balance_path(),
            history_path: default_history_path(),
            sync_interval_secs: default_sync_interval_secs(),
            enabled: true,
            http: ProviderHttpConfig::default(),
        }
    }

    #[must_use]
    pub fn with_sync_interval_secs(mut self, secs: u64) -> Self {
        self.sync_interval_secs = secs;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Full URL of the balance endpoint.
    #[must_use]
    pub fn balance_url(&self) -> String {
        join_url(&self.base_url, &self.balance_path)
    }

    /// Full URL of the history endpoint.
    #[must_use]
    pub fn history_url(&self) -> String {
        join_url(&self.base_url, &self.history_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Provider HTTP client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderHttpConfig {
    /// Request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_http_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

const fn default_http_timeout_ms() -> u64 {
    5000
}

const fn default_http_connect_timeout_ms() -> u64 {
    2000
}

impl Default for ProviderHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
            connect_timeout_ms: default_http_connect_timeout_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_id_and_url_given() {
        let config: ProviderConfig = toml::from_str(
            r#"
            id = "Evolution"
            base_url = "https://api.example/"
            "#,
        )
        .unwrap();

        assert_eq!(config.id.as_str(), "evolution");
        assert_eq!(config.sync_interval_secs, 30);
        assert!(config.enabled);
        assert_eq!(config.http.timeout_ms, 5000);
        assert_eq!(config.balance_url(), "https://api.example/balance");
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://h", "b"), "http://h/b");
        assert_eq!(join_url("http://h/", "/b"), "http://h/b");
    }
}

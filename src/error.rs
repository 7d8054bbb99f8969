use thiserror::Error;

use crate::domain::error::DomainError;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl Error {
    /// The domain error, if this is one.
    #[must_use]
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Error::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// True only for provider-side failures worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.as_domain().is_some_and(DomainError::is_retryable)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::{PartnerId, ProviderId};

    #[test]
    fn retryable_follows_domain_taxonomy() {
        let unavailable: Error = DomainError::ProviderUnavailable {
            provider: ProviderId::new("p"),
            reason: "timeout".into(),
        }
        .into();
        let missing: Error = DomainError::CredentialMissing {
            partner: PartnerId::new("top"),
            provider: ProviderId::new("p"),
        }
        .into();

        assert!(unavailable.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!Error::Database("locked".into()).is_retryable());
    }

    #[test]
    fn config_errors_render_field_names() {
        let err: Error = ConfigError::MissingField { field: "database" }.into();
        assert_eq!(err.to_string(), "missing required field: database");
    }
}

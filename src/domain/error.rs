//! Domain errors for session lifecycle and balance reconciliation.
//!
//! The variants form a closed taxonomy. Callers decide how to react by
//! category, not by message:
//!
//! - [`Conflict`](DomainError::Conflict), [`StaleTransition`](DomainError::StaleTransition)
//!   and [`AlreadyReconciling`](DomainError::AlreadyReconciling) are expected
//!   races. They are absorbed and logged.
//! - [`HierarchyBroken`](DomainError::HierarchyBroken),
//!   [`CredentialMissing`](DomainError::CredentialMissing) and
//!   [`ProviderRejected`](DomainError::ProviderRejected) need an operator.
//!   They are never retried.
//! - [`ProviderUnavailable`](DomainError::ProviderUnavailable) is the only
//!   retryable failure.
//!
//! # Examples
//!
//! ```
//! use gamebridge::domain::error::DomainError;
//! use gamebridge::domain::id::ProviderId;
//!
//! let err = DomainError::ProviderUnavailable {
//!     provider: ProviderId::new("evolution"),
//!     reason: "timeout".into(),
//! };
//! assert!(err.is_retryable());
//! ```

use thiserror::Error;

use super::id::{AccountId, PartnerId, ProviderId, SessionId};
use super::session::SessionStatus;

/// Errors raised when session or balance invariants cannot be upheld.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A live session already exists for the (account, provider) pair.
    #[error("account {account} already has live session {existing} on {provider}")]
    Conflict {
        /// Account owning the sessions.
        account: AccountId,
        /// Provider the sessions belong to.
        provider: ProviderId,
        /// The session that is already live.
        existing: SessionId,
    },

    /// Optimistic concurrency rejection of a status transition.
    #[error("session {session} is {}, expected {expected}", found_status(.actual))]
    StaleTransition {
        /// Session the transition targeted.
        session: SessionId,
        /// Status the caller expected.
        expected: SessionStatus,
        /// Status found on the row; `None` when the edge itself is
        /// forbidden and the row was never read.
        actual: Option<SessionStatus>,
    },

    /// The referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record (`"session"`, `"account"`, `"partner"`).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The partner chain above an account is malformed or unbounded.
    #[error("partner hierarchy broken for account {account}: {reason}")]
    HierarchyBroken {
        /// Account whose chain was walked.
        account: AccountId,
        /// What went wrong during the walk.
        reason: String,
    },

    /// The top-level partner holds no usable credential for the provider.
    #[error("partner {partner} has no usable credential for {provider}")]
    CredentialMissing {
        /// Partner that was queried.
        partner: PartnerId,
        /// Provider the credential was requested for.
        provider: ProviderId,
    },

    /// Network or provider-side failure.
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable {
        /// Provider that failed.
        provider: ProviderId,
        /// Underlying failure.
        reason: String,
    },

    /// The provider refused the request in a way retrying cannot fix
    /// (unknown provider, bad credentials, a response for the wrong player).
    #[error("provider {provider} rejected the request: {reason}")]
    ProviderRejected {
        /// Provider that refused.
        provider: ProviderId,
        /// What the provider objected to.
        reason: String,
    },

    /// Another reconciliation holds the session.
    #[error("session {session} is already being reconciled")]
    AlreadyReconciling {
        /// Session under reconciliation.
        session: SessionId,
    },
}

fn found_status(actual: &Option<SessionStatus>) -> String {
    actual.map_or_else(|| "not read (forbidden edge)".to_string(), |s| s.to_string())
}

impl DomainError {
    /// Shorthand for a missing session.
    #[must_use]
    pub fn session_not_found(id: SessionId) -> Self {
        Self::NotFound {
            entity: "session",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing account.
    #[must_use]
    pub fn account_not_found(id: &AccountId) -> Self {
        Self::NotFound {
            entity: "account",
            id: id.to_string(),
        }
    }

    /// True for failures worth retrying without operator intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }

    /// True for expected races that are absorbed rather than surfaced.
    #[must_use]
    pub fn is_benign_race(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::StaleTransition { .. } | Self::AlreadyReconciling { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_provider_unavailable_is_retryable() {
        let retryable = DomainError::ProviderUnavailable {
            provider: ProviderId::new("p"),
            reason: "503".into(),
        };
        let missing = DomainError::CredentialMissing {
            partner: PartnerId::new("top"),
            provider: ProviderId::new("p"),
        };
        let broken = DomainError::HierarchyBroken {
            account: AccountId::new("u"),
            reason: "cycle".into(),
        };

        let rejected = DomainError::ProviderRejected {
            provider: ProviderId::new("p"),
            reason: "401 Unauthorized".into(),
        };

        assert!(retryable.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!broken.is_retryable());
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn races_are_benign() {
        assert!(DomainError::AlreadyReconciling {
            session: SessionId::new(1)
        }
        .is_benign_race());
        assert!(DomainError::StaleTransition {
            session: SessionId::new(1),
            expected: SessionStatus::Active,
            actual: Some(SessionStatus::Ended),
        }
        .is_benign_race());
        assert!(!DomainError::session_not_found(SessionId::new(1)).is_benign_race());
    }

    #[test]
    fn messages_name_the_subject() {
        let err = DomainError::session_not_found(SessionId::new(9));
        assert_eq!(err.to_string(), "session 9 not found");
    }
}

//! Game session lifecycle types.
//!
//! One [`GameSession`] is one open game window tying an account to a
//! provider. Its [`SessionStatus`] moves forward only:
//!
//! ```text
//! active ──> ending ──> ended
//!    │          └─────> force_ended
//!    └────────────────> force_ended   (stuck-session recovery)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{AccountId, ProviderId, SessionId};

/// Status of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Game window open; the provider holds the balance.
    Active,
    /// Reconciliation with the provider in flight.
    Ending,
    /// Reconciled and written back to the ledger.
    Ended,
    /// Closed without reconciliation; the client is shown a notice.
    ForceEnded,
}

impl SessionStatus {
    /// Returns true for `active` and `ending`.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Ending)
    }

    /// Returns true for `ended` and `force_ended`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_live()
    }

    /// Whether `self -> next` is an allowed edge.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Ending)
                | (Self::Active, Self::ForceEnded)
                | (Self::Ending, Self::Ended)
                | (Self::Ending, Self::ForceEnded)
        )
    }

    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ending => "ending",
            Self::Ended => "ended",
            Self::ForceEnded => "force_ended",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown session status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for SessionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ending" => Ok(Self::Ending),
            "ended" => Ok(Self::Ended),
            "force_ended" => Ok(Self::ForceEnded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Values needed to open a session; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub account_id: AccountId,
    pub provider_id: ProviderId,
    pub balance_at_launch: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One open (or recently closed) game window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub account_id: AccountId,
    pub provider_id: ProviderId,
    pub status: SessionStatus,
    /// Ledger balance snapshot taken when the game launched.
    pub balance_at_launch: Decimal,
    pub created_at: DateTime<Utc>,
    /// Last status change (creation time until the first transition).
    pub updated_at: DateTime<Utc>,
    /// Set when the session enters a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
    /// Some client asked every client to close this game window.
    pub close_requested: bool,
}

impl GameSession {
    /// Materialize a freshly inserted session.
    #[must_use]
    pub fn from_new(id: SessionId, new: NewSession) -> Self {
        Self {
            id,
            account_id: new.account_id,
            provider_id: new.provider_id,
            status: SessionStatus::Active,
            balance_at_launch: new.balance_at_launch,
            created_at: new.created_at,
            updated_at: new.created_at,
            ended_at: None,
            close_requested: false,
        }
    }

    /// Returns true while the session balance shadows the ledger.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status.is_live()
    }

    /// Apply a status change, stamping `ended_at` on terminal entry.
    ///
    /// Callers validate the edge first; this only mutates.
    pub fn apply_status(&mut self, status: SessionStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        if status.is_terminal() {
            self.ended_at = Some(at);
        }
    }

    /// Whether a terminal session has outlived `retention` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        match (self.status.is_terminal(), self.ended_at) {
            (true, Some(ended_at)) => now - ended_at > retention,
            _ => false,
        }
    }
}

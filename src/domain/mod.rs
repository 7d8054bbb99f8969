//! Exchange-free domain types for sessions, balances, and the partner tree.
//!
//! Nothing here performs I/O. Persistence and provider access live behind
//! the traits in [`crate::port`].

pub mod account;
pub mod balance;
pub mod bet;
pub mod error;
pub mod id;
pub mod partner;
pub mod session;

pub use account::Account;
pub use balance::{BalanceSource, DisplayBalance};
pub use bet::{SettledBet, SyncCursor};
pub use error::DomainError;
pub use id::{AccountId, PartnerId, ProviderId, SessionId};
pub use partner::{Partner, ProviderCredential};
pub use session::{GameSession, NewSession, SessionStatus};

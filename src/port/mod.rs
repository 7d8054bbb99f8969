//! Trait definitions (hexagonal ports). Depend only on domain.
//!
//! Ports define the extension points in the hexagonal architecture.
//! Adapters implement them to integrate with the hosted backend and the
//! game providers.
//!
//! # Architecture
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │      Application        │
//!                    │  registry · reconciler  │
//!     ┌──────────────┤  listener · scheduler   ├──────────────┐
//!     │              └─────────────────────────┘              │
//!     │                         │                             │
//!     ▼                         ▼                             ▼
//! ┌─────────┐            ┌─────────────┐              ┌───────────┐
//! │Provider │            │ Store/Feed  │              │ Notifier  │
//! │ Adapter │            │   Adapter   │              │  Adapter  │
//! └─────────┘            └─────────────┘              └───────────┘
//! ```
//!
//! # Available Ports
//!
//! - [`Store`] and its parts - Accounts, partners, sessions, sync cursors
//! - [`ChangeFeed`] - Row-level change notifications
//! - [`ProviderGateway`] - Provider balance and history calls
//! - [`Notifier`] - UI-facing events

pub mod outbound;

pub use outbound::feed::{Change, ChangeFeed, FeedFilter, FeedMessage, FeedSubscription, Table};
pub use outbound::notifier::{
    Event, NoticeEvent, Notifier, NotifierRegistry, NullNotifier, SessionEvent, SyncEvent,
    FORCE_END_NOTICE,
};
pub use outbound::provider::ProviderGateway;
pub use outbound::store::{AccountStore, PartnerStore, SessionStore, Store, SyncStore};

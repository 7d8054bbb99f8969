//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! to implement the engine's use cases.

pub mod credential;
pub mod listener;
pub mod presence;
pub mod reaper;
pub mod reconcile;
pub mod session;
pub mod signal;
pub mod sync;

pub use credential::PartnerCredentialResolver;
pub use listener::{ChangeFeedListener, ListenerHandle};
pub use presence::PresenceGuard;
pub use reaper::{ReaperConfig, StaleSessionReaper, SweepReport};
pub use reconcile::{BalanceReconciler, EndOutcome, ReconciliationGuard, RetryPolicy};
pub use session::SessionRegistry;
pub use signal::{WindowSignal, WindowSignalBus};
pub use sync::{ProviderSchedule, ProviderSyncScheduler};

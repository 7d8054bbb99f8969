//! Game-window signals.
//!
//! Game windows run outside the engine and only know their session id. They
//! report back through a [`WindowSignalBus`]; a dispatcher task turns each
//! signal into a reconciler call.
//!
//! ```text
//! game window --send()--> WindowSignalBus --(mpsc)--> dispatcher
//!                                                        |
//!                                                        +-- ForceClose    -> force_close_game_window
//!                                                        +-- SyncAfterGame -> sync_balance_after_game
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::reconcile::{BalanceReconciler, EndOutcome};
use crate::domain::SessionId;
use crate::error::{Error, Result};

/// Default bus capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// A request raised by a game window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSignal {
    /// Close the window on every client and reconcile.
    ForceClose(SessionId),
    /// The game finished; reconcile now.
    SyncAfterGame(SessionId),
}

impl WindowSignal {
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        match self {
            Self::ForceClose(id) | Self::SyncAfterGame(id) => *id,
        }
    }
}

/// Sending half handed to game windows.
#[derive(Debug, Clone)]
pub struct WindowSignalBus {
    tx: mpsc::Sender<WindowSignal>,
}

impl WindowSignalBus {
    /// Create a bus and the receiver a dispatcher drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WindowSignal>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Create a bus with a dispatcher already running against `reconciler`.
    pub fn spawn(
        reconciler: Arc<BalanceReconciler>,
        capacity: usize,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (bus, rx) = Self::channel(capacity);
        let handle = tokio::spawn(dispatch(reconciler, rx, shutdown));
        (bus, handle)
    }

    /// Queue a signal. Fails once the dispatcher has stopped.
    pub async fn send(&self, signal: WindowSignal) -> Result<()> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| Error::ChannelClosed("window signals"))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drain `rx` until every sender is dropped or shutdown fires.
///
/// Each signal runs on its own task so a slow provider never blocks other
/// windows.
pub async fn dispatch(
    reconciler: Arc<BalanceReconciler>,
    mut rx: mpsc::Receiver<WindowSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            signal = rx.recv() => {
                let Some(signal) = signal else {
                    debug!("Window signal bus closed");
                    break;
                };
                let reconciler = Arc::clone(&reconciler);
                tokio::spawn(async move {
                    handle(&reconciler, signal).await;
                });
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    info!("Window signal dispatcher shutting down");
                    break;
                }
            }
        }
    }
}

async fn handle(reconciler: &BalanceReconciler, signal: WindowSignal) {
    let session_id = signal.session_id();
    let result = match signal {
        WindowSignal::ForceClose(id) => reconciler.force_close_game_window(id).await,
        WindowSignal::SyncAfterGame(id) => reconciler.sync_balance_after_game(id).await,
    };
    match result {
        Ok(EndOutcome::Settled { balance }) => {
            debug!(session = %session_id, %balance, "Window signal settled session");
        }
        Ok(outcome) => debug!(session = %session_id, ?outcome, "Window signal handled"),
        Err(e) => warn!(session = %session_id, error = %e, "Window signal failed"),
    }
}

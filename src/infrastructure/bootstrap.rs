//! Composition root: builds the engine from configuration and owns its
//! background tasks.
//!
//! ```text
//! Config ──► SqliteStore (Store + ChangeFeed)
//!        ──► HttpProviderClient (ProviderGateway)
//!        ──► NotifierRegistry [LogNotifier]
//!                    │
//!                    ▼
//!                 Engine ──► reaper task
//!                        ──► signal dispatcher task
//!                        ──► presence watcher task
//!                        ──► sync timers (per partner scope)
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapter::outbound::notifier::LogNotifier;
use crate::adapter::outbound::provider::HttpProviderClient;
use crate::adapter::outbound::sqlite::database::connection::{create_pool, run_migrations};
use crate::adapter::outbound::{FeedHub, SqliteStore};
use crate::application::{
    BalanceReconciler, ChangeFeedListener, ListenerHandle, PartnerCredentialResolver,
    PresenceGuard, ProviderSyncScheduler, ReconciliationGuard, SessionRegistry,
    StaleSessionReaper, WindowSignalBus,
};
use crate::domain::AccountId;
use crate::error::Result;
use crate::infrastructure::config::settings::Config;
use crate::port::{
    Change, ChangeFeed, FeedFilter, FeedMessage, NotifierRegistry, ProviderGateway, Store, Table,
};

/// Build notifier registry with the default log notifier.
#[must_use]
pub fn build_notifier_registry() -> NotifierRegistry {
    let mut registry = NotifierRegistry::new();
    registry.register(Box::new(LogNotifier));
    registry
}

/// Open the SQLite database, apply migrations and wrap it in a store.
pub fn init_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let pool = create_pool(&config.database)?;
    run_migrations(&pool)?;
    info!(database = %config.database, "Database initialized");
    Ok(Arc::new(SqliteStore::new(pool, FeedHub::new(config.feed.capacity))))
}

/// HTTP gateway over every configured provider.
#[must_use]
pub fn build_gateway(config: &Config) -> Arc<dyn ProviderGateway> {
    let client = HttpProviderClient::from_configs(&config.providers);
    info!(providers = client.providers().count(), "Provider gateway initialized");
    Arc::new(client)
}

/// External collaborators the engine is assembled around.
pub struct Components {
    pub store: Arc<dyn Store>,
    pub feed: Arc<dyn ChangeFeed>,
    pub gateway: Arc<dyn ProviderGateway>,
    pub notifiers: NotifierRegistry,
}

impl Components {
    /// SQLite store, HTTP providers and the log notifier.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = init_store(config)?;
        Ok(Self {
            store: store.clone(),
            feed: store,
            gateway: build_gateway(config),
            notifiers: build_notifier_registry(),
        })
    }
}

/// Running engine and its background tasks.
pub struct Engine {
    store: Arc<dyn Store>,
    feed: Arc<dyn ChangeFeed>,
    registry: Arc<SessionRegistry>,
    reconciler: Arc<BalanceReconciler>,
    scheduler: Arc<ProviderSyncScheduler>,
    signals: WindowSignalBus,
    notifiers: Arc<NotifierRegistry>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Wire services, spawn background tasks and start provider sync for
    /// every configured partner scope.
    pub async fn start(config: &Config, components: Components) -> Result<Self> {
        let Components {
            store,
            feed,
            gateway,
            notifiers,
        } = components;
        let notifiers = Arc::new(notifiers);
        info!(notifiers = notifiers.len(), "Notifiers initialized");

        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        let resolver = Arc::new(PartnerCredentialResolver::new(Arc::clone(&store)));
        let guard = ReconciliationGuard::new();
        let reconciler = Arc::new(
            BalanceReconciler::new(
                Arc::clone(&store),
                Arc::clone(&registry),
                Arc::clone(&resolver),
                Arc::clone(&gateway),
                Arc::clone(&notifiers),
            )
            .with_retry_policy(config.reconciler.clone())
            .with_guard(guard.clone()),
        );
        let presence = Arc::new(
            PresenceGuard::new(
                Arc::clone(&store),
                Arc::clone(&registry),
                Arc::clone(&notifiers),
            )
            .with_debounce(config.presence.debounce()),
        );
        let reaper = Arc::new(StaleSessionReaper::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            guard,
            Arc::clone(&notifiers),
            config.reaper.clone(),
        ));
        let scheduler = Arc::new(ProviderSyncScheduler::new(
            Arc::clone(&store),
            resolver,
            gateway,
            Arc::clone(&notifiers),
            config.schedules(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // A crash may have left sessions in `ending`; recover before serving.
        let report = reaper.sweep(Utc::now()).await;
        debug!(
            recovered = report.recovered,
            deleted = report.deleted,
            "Startup sweep finished"
        );

        let (signals, dispatcher) = WindowSignalBus::spawn(
            Arc::clone(&reconciler),
            config.feed.signal_capacity,
            shutdown_rx.clone(),
        );
        let tasks = vec![
            Arc::clone(&reaper).spawn(shutdown_rx.clone()),
            dispatcher,
            tokio::spawn(watch_presence(
                Arc::clone(&feed),
                presence,
                shutdown_rx,
            )),
        ];

        for scope in &config.sync.partners {
            if let Err(e) = scheduler.start(scope).await {
                warn!(partner = %scope, error = %e, "Failed to start provider sync");
            }
        }

        info!("Engine started");
        Ok(Self {
            store,
            feed,
            registry,
            reconciler,
            scheduler,
            signals,
            notifiers,
            shutdown_tx,
            tasks,
        })
    }

    /// Attach a balance listener for one signed-in client.
    ///
    /// `client` receives that client's balance pushes and force-end notices.
    /// It is kept apart from the engine registry, which already carries the
    /// reconciler's own events, so each notice reaches the player once. The
    /// listener stops with the engine.
    #[must_use]
    pub fn listen(&self, account_id: AccountId, client: Arc<NotifierRegistry>) -> ListenerHandle {
        ChangeFeedListener::new(
            account_id,
            Arc::clone(&self.feed),
            Arc::clone(&self.reconciler),
            client,
        )
        .spawn(self.shutdown_tx.subscribe())
    }

    /// Registry the engine services report to.
    #[must_use]
    pub fn notifiers(&self) -> &Arc<NotifierRegistry> {
        &self.notifiers
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<BalanceReconciler> {
        &self.reconciler
    }

    #[must_use]
    pub fn scheduler(&self) -> &Arc<ProviderSyncScheduler> {
        &self.scheduler
    }

    /// Bus handed to game windows.
    #[must_use]
    pub fn signals(&self) -> WindowSignalBus {
        self.signals.clone()
    }

    /// Stop timers, signal every task and wait for them.
    ///
    /// In-flight reconciliations spawned by the dispatcher are not
    /// cancelled; they finish on their own.
    pub async fn shutdown(self) {
        info!("Engine shutting down");
        self.scheduler.stop();
        let _ = self.shutdown_tx.send(true);
        for result in futures_util::future::join_all(self.tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Engine stopped");
    }
}

/// Forward every account update to the presence guard.
async fn watch_presence(
    feed: Arc<dyn ChangeFeed>,
    presence: Arc<PresenceGuard>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut subscription = feed.subscribe(FeedFilter::table(Table::Accounts));
    loop {
        tokio::select! {
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            message = subscription.recv() => match message {
                Some(FeedMessage::Change(Change::Account { old, new })) => {
                    presence.observe(old.as_ref(), &new);
                }
                Some(FeedMessage::Change(_)) => {}
                Some(FeedMessage::Lagged(skipped)) => {
                    warn!(skipped, "Presence watcher lagged; offline flips may be missed");
                }
                None => break,
            }
        }
    }
    debug!("Presence watcher stopped");
}

/// Build the engine from `config` and run it until `shutdown` fires.
pub async fn run_with_shutdown(config: Config, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    info!(
        database = %config.database,
        providers = config.providers.len(),
        "Starting gamebridge"
    );
    let components = Components::from_config(&config)?;
    let engine = Engine::start(&config, components).await?;

    loop {
        match shutdown.changed().await {
            Ok(()) if *shutdown.borrow() => {
                info!("Shutdown signal received");
                break;
            }
            Ok(()) => {}
            Err(_) => {
                info!("Shutdown channel closed");
                break;
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

use std::sync::Arc;

use gamebridge::application::{
    BalanceReconciler, PartnerCredentialResolver, SessionRegistry,
};
use gamebridge::port::Store;
use gamebridge::testkit::config::fast_retry;
use gamebridge::testkit::notifier::RecordingNotifier;
use gamebridge::testkit::provider::ScriptedGateway;

/// Reconciliation services wired over one store and a scripted provider.
pub struct Services {
    pub store: Arc<dyn Store>,
    pub registry: Arc<SessionRegistry>,
    pub resolver: Arc<PartnerCredentialResolver>,
    pub reconciler: Arc<BalanceReconciler>,
    pub gateway: ScriptedGateway,
    pub events: RecordingNotifier,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, gateway: ScriptedGateway) -> Self {
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&store)));
        let resolver = Arc::new(PartnerCredentialResolver::new(Arc::clone(&store)));
        let events = RecordingNotifier::new();
        let reconciler = BalanceReconciler::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&resolver),
            Arc::new(gateway.clone()),
            events.registry(),
        )
        .with_retry_policy(fast_retry());
        Self {
            store,
            registry,
            resolver,
            reconciler: Arc::new(reconciler),
            gateway,
            events,
        }
    }
}

//! Shared daemon state handed to the API, push channel and sweeper.

use std::sync::Arc;

use ccmon_core::SessionRegistry;
use tokio::sync::Mutex;

use crate::config::DaemonConfig;
use crate::notify::{AlertListener, NotificationGateway};
use crate::push::PushHub;

/// The registry behind the daemon's single lock. Every API call, kill
/// command and sweep removal is one lock scope.
pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub hub: Arc<PushHub>,
    pub config: Arc<DaemonConfig>,
    pub gateway: NotificationGateway,
}

impl AppState {
    /// Build an empty registry with the push hub and alert listener attached.
    pub fn new(config: Arc<DaemonConfig>, gateway: NotificationGateway) -> Self {
        let hub = Arc::new(PushHub::new());
        let mut registry = SessionRegistry::new();
        registry.add_listener(hub.clone());
        registry.add_listener(Arc::new(AlertListener::new(
            gateway.clone(),
            Arc::clone(&config),
        )));
        Self {
            registry: Arc::new(Mutex::new(registry)),
            hub,
            config,
            gateway,
        }
    }
}

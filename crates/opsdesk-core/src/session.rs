use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::alert::{AlertGate, AlertPlayer, GestureSource};
use crate::channel::{Connection, ConnectionManager, LineTransport, PushTransport};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::events::Identity;
use crate::notifications::NotificationCenter;
use crate::pull::{HttpPullClient, SharedPullClient};
use crate::router::EventRouter;
use crate::stats::{DeliveryStats, SharedDeliveryStats};
use crate::views::{AuditLogView, LiveView, NoticeSink, ViewSpec};

/// One signed-in session: a push connection, the router that fans its
/// frames out, the pull client and the alert gate.
///
/// Views are mounted from here and own their subscriptions; the session
/// only owns what is shared between them.
pub struct SyncSession {
    config: SyncConfig,
    router: EventRouter,
    stats: SharedDeliveryStats,
    pull: SharedPullClient,
    gate: AlertGate,
    connections: ConnectionManager,
}

impl SyncSession {
    pub fn new(
        config: SyncConfig,
        transport: Arc<dyn PushTransport>,
        pull: SharedPullClient,
        player: Arc<dyn AlertPlayer>,
    ) -> Self {
        let stats = SharedDeliveryStats::new();
        let router = EventRouter::with_stats(stats.clone());
        let connections = ConnectionManager::new(transport, router.clone());
        Self {
            config,
            router,
            stats,
            pull,
            gate: AlertGate::new(player),
            connections,
        }
    }

    /// Session wired to the TCP push channel and the REST API from `config`.
    pub fn from_config(config: SyncConfig, player: Arc<dyn AlertPlayer>) -> SyncResult<Self> {
        config.validate()?;
        let transport = Arc::new(LineTransport::from_config(&config));
        let pull = Arc::new(HttpPullClient::from_config(&config)?);
        Ok(Self::new(config, transport, pull, player))
    }

    /// Open the push connection. Idempotent; see [`ConnectionManager::connect`].
    pub async fn connect(&self, identity: Identity) -> SyncResult<Arc<Connection>> {
        self.connections.connect(identity).await
    }

    /// Like `connect`, but an unreachable push channel is not fatal: the
    /// session keeps running on pulls alone and `None` is returned.
    pub async fn start(&self, identity: Identity) -> Option<Arc<Connection>> {
        match self.connect(identity).await {
            Ok(connection) => Some(connection),
            Err(e) => {
                warn!("push channel unavailable, continuing pull-only: {}", e);
                None
            }
        }
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connections.connection()
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn pull(&self) -> &SharedPullClient {
        &self.pull
    }

    pub fn alert_gate(&self) -> &AlertGate {
        &self.gate
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats.snapshot()
    }

    /// Wait for the first qualifying gesture to unlock the chime.
    pub fn arm_alerts(&self, source: &dyn GestureSource) {
        self.gate.arm(source);
    }

    /// Mount the notification center and start its poll loop.
    pub fn mount_notifications(&self) -> NotificationCenter {
        let mut center =
            NotificationCenter::mount(&self.router, self.pull.clone(), self.gate.clone());
        center.start_polling(self.config.initial_pull_delay(), self.config.poll_interval());
        center
    }

    pub fn mount_audit(&self, notices: Arc<dyn NoticeSink>) -> AuditLogView {
        AuditLogView::mount(&self.router, self.pull.clone(), notices)
    }

    pub fn mount_view<T>(&self, spec: ViewSpec) -> LiveView<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        LiveView::mount(&self.router, self.pull.clone(), spec)
    }

    /// Tear down the push connection. Mounted views keep working on pulls.
    pub fn close(&self) {
        if self.connection().is_some() {
            info!("closing session");
        }
        self.connections.close();
        self.gate.disarm();
    }
}

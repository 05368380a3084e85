use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::AbortHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::{PushTransport, TransportLink};
use crate::constants::INBOUND_CHANNEL_CAPACITY;
use crate::error::SyncResult;
use crate::events::{Identity, PushFrame};
use crate::router::EventRouter;

/// The session's single push connection.
pub struct Connection {
    handle: Uuid,
    identity: Identity,
    status: watch::Receiver<bool>,
}

impl Connection {
    pub fn handle(&self) -> Uuid {
        self.handle
    }

    /// Identity used for the join; later `connect` calls cannot change it.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Current physical link state. Subscriptions stay valid while this
    /// flips during reconnects.
    pub fn is_connected(&self) -> bool {
        *self.status.borrow()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .field("identity", &self.identity)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Owns the push connection for one session and pumps its frames into the
/// router.
pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    router: EventRouter,
    connection: OnceCell<Arc<Connection>>,
    tasks: Mutex<Vec<AbortHandle>>,
    link_status: Mutex<Option<watch::Sender<bool>>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn PushTransport>, router: EventRouter) -> Self {
        Self {
            transport,
            router,
            connection: OnceCell::new(),
            tasks: Mutex::new(Vec::new()),
            link_status: Mutex::new(None),
        }
    }

    /// Open the connection, or return the existing one unchanged.
    ///
    /// Concurrent first callers share one handshake; only the identity of
    /// the caller that performs it is joined. A failed handshake leaves the
    /// manager unconnected so a later call can retry.
    pub async fn connect(&self, identity: Identity) -> SyncResult<Arc<Connection>> {
        let connection = self
            .connection
            .get_or_try_init(|| self.establish(identity))
            .await?;
        Ok(connection.clone())
    }

    /// Never blocks and never connects.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.get().cloned()
    }

    async fn establish(&self, identity: Identity) -> SyncResult<Arc<Connection>> {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(false);

        let transport_task = self
            .transport
            .open(
                identity.clone(),
                TransportLink {
                    inbound: inbound_tx,
                    status: status_tx.clone(),
                },
            )
            .await?;

        let pump = tokio::spawn(pump(inbound_rx, self.router.clone()));
        let watcher = tokio::spawn(log_transitions(status_rx.clone()));
        {
            let mut tasks = self.tasks.lock();
            tasks.push(pump.abort_handle());
            tasks.push(watcher.abort_handle());
            tasks.extend(transport_task);
        }
        *self.link_status.lock() = Some(status_tx);

        let connection = Arc::new(Connection {
            handle: Uuid::new_v4(),
            identity,
            status: status_rx,
        });
        info!(handle = %connection.handle, identity = %connection.identity, "session connected");
        Ok(connection)
    }

    /// Stop pumping frames and tear the transport down. The connection
    /// object stays readable and reports the link as down; `connect` keeps
    /// returning it.
    pub fn close(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if !tasks.is_empty() {
            debug!(tasks = tasks.len(), "closing push connection");
        }
        for task in tasks {
            task.abort();
        }
        if let Some(status) = self.link_status.lock().take() {
            status.send_replace(false);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forward frames to the router in arrival order.
async fn pump(mut inbound: mpsc::Receiver<PushFrame>, router: EventRouter) {
    while let Some(frame) = inbound.recv().await {
        router.dispatch_frame(&frame);
    }
    debug!("push channel closed");
}

async fn log_transitions(mut status: watch::Receiver<bool>) {
    while status.changed().await.is_ok() {
        if *status.borrow_and_update() {
            info!("push link up");
        } else {
            info!("push link down, running pull-only until it returns");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryTransport;
    use crate::events::Topic;
    use crate::test_support::settle;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> (ConnectionManager, MemoryTransport, EventRouter) {
        let transport = MemoryTransport::new();
        let router = EventRouter::new();
        (
            ConnectionManager::new(Arc::new(transport.clone()), router.clone()),
            transport,
            router,
        )
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (manager, transport, _) = manager();
        assert!(manager.connection().is_none());

        let first = manager.connect(Identity::new("alice")).await.unwrap();
        let second = manager.connect(Identity::new("bob")).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.identity(), &Identity::new("alice"));
        assert_eq!(transport.join_count(), 1);
        assert!(Arc::ptr_eq(&manager.connection().unwrap(), &first));
    }

    #[tokio::test]
    async fn test_concurrent_first_connects_share_one_join() {
        let (manager, transport, _) = manager();
        let (a, b) = tokio::join!(
            manager.connect(Identity::new("alice")),
            manager.connect(Identity::new("bob"))
        );
        assert_eq!(a.unwrap().handle(), b.unwrap().handle());
        assert_eq!(transport.join_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_handshake_can_be_retried() {
        let (manager, transport, _) = manager();
        transport.refuse_connections(true);
        assert!(manager.connect(Identity::new("alice")).await.is_err());
        assert!(manager.connection().is_none());

        transport.refuse_connections(false);
        let connection = manager.connect(Identity::new("alice")).await.unwrap();
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_frames_reach_router_and_survive_reconnect() {
        let (manager, transport, router) = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = router.subscribe(Topic::LeaveCreated, move |_: &Value| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let connection = manager.connect(Identity::new("reviewer")).await.unwrap();
        assert!(transport.push(Topic::LeaveCreated, json!({"id": 3})).await);
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        transport.disconnect();
        assert!(!connection.is_connected());
        transport.reconnect();
        assert!(connection.is_connected());
        assert_eq!(transport.joins(), vec![Identity::new("reviewer"); 2]);

        assert!(transport.push(Topic::LeaveCreated, json!({"id": 4})).await);
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let (manager, transport, router) = manager();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = router.subscribe(Topic::AuditLog, move |_: &Value| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let connection = manager.connect(Identity::new("admin")).await.unwrap();
        assert!(connection.is_connected());
        manager.close();
        settle().await;
        assert!(!connection.is_connected());
        assert!(!transport.push(Topic::AuditLog, Value::Null).await);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(manager.connection().is_some());
    }
}

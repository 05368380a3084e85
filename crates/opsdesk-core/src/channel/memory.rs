use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::AbortHandle;
use tracing::debug;

use super::{PushTransport, TransportLink};
use crate::error::{SyncError, SyncResult};
use crate::events::{Identity, PushFrame, Topic};

#[derive(Default)]
struct MemoryState {
    joins: Vec<Identity>,
    link: Option<TransportLink>,
    refuse: bool,
}

/// In-process push transport. Lets embedders and tests inject frames and
/// simulate disconnects without a server.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next handshakes fail, as if the server were unreachable.
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Join messages sent so far (one per handshake, including rejoins)
    pub fn joins(&self) -> Vec<Identity> {
        self.state.lock().joins.clone()
    }

    pub fn join_count(&self) -> usize {
        self.state.lock().joins.len()
    }

    /// Deliver a frame as if the server pushed it. Returns false when no
    /// connection is open or the receiving side is gone.
    pub async fn push_frame(&self, frame: PushFrame) -> bool {
        let inbound = match &self.state.lock().link {
            Some(link) => link.inbound.clone(),
            None => return false,
        };
        inbound.send(frame).await.is_ok()
    }

    pub async fn push(&self, topic: Topic, payload: Value) -> bool {
        self.push_frame(PushFrame::new(topic, payload)).await
    }

    pub fn disconnect(&self) {
        if let Some(link) = &self.state.lock().link {
            link.status.send_replace(false);
        }
    }

    /// Transport-level reconnect: rejoin with the first identity.
    pub fn reconnect(&self) {
        let mut state = self.state.lock();
        let identity = state.joins.first().cloned();
        if let (Some(identity), Some(link)) = (identity, state.link.clone()) {
            state.joins.push(identity);
            link.status.send_replace(true);
            debug!("memory transport rejoined");
        }
    }
}

impl PushTransport for MemoryTransport {
    fn open(
        &self,
        identity: Identity,
        link: TransportLink,
    ) -> BoxFuture<'_, SyncResult<Option<AbortHandle>>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if state.refuse {
                return Err(SyncError::connection("memory transport refusing connections"));
            }
            state.joins.push(identity);
            link.status.send_replace(true);
            state.link = Some(link);
            Ok(None)
        })
    }
}

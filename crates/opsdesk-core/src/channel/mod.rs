pub mod connection;
pub mod line_transport;
pub mod memory;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;

use crate::error::SyncResult;
use crate::events::{Identity, PushFrame};

pub use connection::{Connection, ConnectionManager};
pub use line_transport::LineTransport;
pub use memory::MemoryTransport;

/// Where a transport delivers what it receives.
#[derive(Debug, Clone)]
pub struct TransportLink {
    /// Inbound frames, in arrival order
    pub inbound: mpsc::Sender<PushFrame>,
    /// Physical link state; flips on every disconnect/reconnect
    pub status: watch::Sender<bool>,
}

/// The push collaborator.
///
/// `open` resolves once the initial handshake (connect + join) is done.
/// After that the transport owns the physical link: it reconnects on its
/// own and re-sends the join with the same identity, without any
/// involvement from subscribers. It stops once `link.inbound` is closed.
pub trait PushTransport: Send + Sync {
    fn open(
        &self,
        identity: Identity,
        link: TransportLink,
    ) -> BoxFuture<'_, SyncResult<Option<AbortHandle>>>;
}

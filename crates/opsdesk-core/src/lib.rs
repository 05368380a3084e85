pub mod alert;
pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod notifications;
pub mod pull;
pub mod refresh;
pub mod router;
pub mod session;
pub mod stats;
pub mod views;

#[cfg(test)]
mod test_support;

// Re-export the session surface at crate root for convenience
pub use alert::{AlertGate, AlertGateState, AlertPlayer, GestureBus, GestureKind, GestureSource};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use events::{Identity, PushFrame, Topic};
pub use router::{EventRouter, Subscription, SubscriptionScope};
pub use session::SyncSession;

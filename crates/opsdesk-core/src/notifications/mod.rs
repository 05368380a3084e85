pub mod center;
pub mod reconciler;

pub use center::{NotificationCenter, RefreshCause};
pub use reconciler::{NotificationReconciler, Reconciliation, ReconcilerState};

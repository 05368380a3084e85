use crate::models::NotificationRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerState {
    pub last_unread_count: usize,
    /// Set by the first completed pull; no alert can fire before it.
    pub initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub should_alert: bool,
    pub unread_count: usize,
}

/// Decides when pulled notification state warrants a chime.
///
/// A poller alone cannot tell "still unread from before" apart from "new
/// since last time", so we remember the previous unread count and only
/// alert on an increase. The first pull sets the baseline silently, which
/// keeps page load quiet even when unread items already exist.
#[derive(Debug, Default, Clone)]
pub struct NotificationReconciler {
    state: ReconcilerState,
}

impl NotificationReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReconcilerState {
        self.state
    }

    pub fn reconcile(&mut self, pulled: &[NotificationRecord]) -> Reconciliation {
        let unread_count = NotificationRecord::unread_count(pulled);

        let should_alert = if self.state.initialized {
            unread_count > self.state.last_unread_count
        } else {
            self.state.initialized = true;
            false
        };
        self.state.last_unread_count = unread_count;

        Reconciliation {
            should_alert,
            unread_count,
        }
    }

    /// A `notification:new` push always alerts; the count is left for the
    /// follow-up pull to update.
    pub fn on_push(&self) -> Reconciliation {
        Reconciliation {
            should_alert: true,
            unread_count: self.state.last_unread_count,
        }
    }
}

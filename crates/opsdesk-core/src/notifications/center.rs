use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use super::reconciler::{NotificationReconciler, Reconciliation, ReconcilerState};
use crate::alert::AlertGate;
use crate::constants::paths;
use crate::error::SyncResult;
use crate::events::Topic;
use crate::models::NotificationRecord;
use crate::pull::{pull_data, PullRequest, SharedPullClient};
use crate::refresh::{LoaderStatus, RefreshLoader};
use crate::router::{EventRouter, SubscriptionScope};

/// Why a pull is happening. A push has already chimed, so the pull that
/// follows it only updates the list and the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCause {
    Pull,
    Push,
}

#[derive(Default)]
struct CenterState {
    items: Vec<NotificationRecord>,
    reconciler: NotificationReconciler,
}

type Loader = RefreshLoader<Vec<NotificationRecord>>;

/// The notification view: list, unread badge and chime decisions.
pub struct NotificationCenter {
    state: Arc<Mutex<CenterState>>,
    loader: Loader,
    pull: SharedPullClient,
    gate: AlertGate,
    // held for its drop
    _scope: SubscriptionScope,
    poller: Option<JoinHandle<()>>,
}

async fn refresh_with(
    loader: &Loader,
    state: &Weak<Mutex<CenterState>>,
    gate: &AlertGate,
    cause: RefreshCause,
) -> SyncResult<Option<Reconciliation>> {
    let mut outcome = None;
    loader
        .run_into(state, |st: &mut CenterState, records| {
            outcome = Some(st.reconciler.reconcile(&records));
            st.items = records;
        })
        .await?;

    if let Some(result) = outcome {
        if result.should_alert && cause == RefreshCause::Pull {
            gate.play().await;
        }
    }
    Ok(outcome)
}

impl NotificationCenter {
    pub fn mount(router: &EventRouter, pull: SharedPullClient, gate: AlertGate) -> Self {
        let fetch_client = pull.clone();
        let loader: Loader = RefreshLoader::new("notifications", move || {
            let pull = fetch_client.clone();
            async move { pull_data(pull.as_ref(), PullRequest::get(paths::NOTIFICATIONS)).await }
        });

        let state = Arc::new(Mutex::new(CenterState::default()));
        let mut scope = SubscriptionScope::new("notifications", router);

        let weak = Arc::downgrade(&state);
        let push_loader = loader.clone();
        let push_gate = gate.clone();
        scope.subscribe(Topic::NotificationNew, move |_: &Value| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let decision = state.lock().reconciler.on_push();
            drop(state);

            let weak = weak.clone();
            let loader = push_loader.clone();
            let gate = push_gate.clone();
            tokio::spawn(async move {
                if decision.should_alert {
                    gate.play().await;
                }
                if let Err(e) = refresh_with(&loader, &weak, &gate, RefreshCause::Push).await {
                    debug!("notification refresh after push failed: {}", e);
                }
            });
        });

        Self {
            state,
            loader,
            pull,
            gate,
            _scope: scope,
            poller: None,
        }
    }

    /// Pull, reconcile and chime if a new unread item appeared.
    /// Returns `None` if the view was unmounted meanwhile.
    pub async fn refresh(&self) -> SyncResult<Option<Reconciliation>> {
        refresh_with(
            &self.loader,
            &Arc::downgrade(&self.state),
            &self.gate,
            RefreshCause::Pull,
        )
        .await
    }

    /// Deferred first pull after `initial_delay`, then one pull every
    /// `interval`. Replaces any running poller; stops with the view.
    pub fn start_polling(&mut self, initial_delay: Duration, interval: Duration) {
        self.stop_polling();

        let weak = Arc::downgrade(&self.state);
        let loader = self.loader.clone();
        let gate = self.gate.clone();
        self.poller = Some(tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                if weak.strong_count() == 0 {
                    break;
                }
                if let Err(e) = refresh_with(&loader, &weak, &gate, RefreshCause::Pull).await {
                    debug!("notification poll failed: {}", e);
                }
                tokio::time::sleep(interval).await;
            }
        }));
    }

    pub fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }

    /// Server-confirmed mark-read; the list is then replaced by the server
    /// state. Nothing is flipped locally.
    pub async fn mark_read(&self, id: &str) -> SyncResult<()> {
        self.pull
            .send(PullRequest::patch(paths::notification_read(id)))
            .await?;
        self.refresh().await?;
        Ok(())
    }

    pub async fn mark_all_read(&self) -> SyncResult<()> {
        self.pull
            .send(PullRequest::patch(paths::NOTIFICATIONS_READ_ALL))
            .await?;
        self.refresh().await?;
        Ok(())
    }

    /// Empty the list immediately, then always reconcile against the
    /// server, which restores the list if the delete did not happen.
    pub async fn clear_all(&self) -> SyncResult<()> {
        self.state.lock().items.clear();
        let deleted = self
            .pull
            .send(PullRequest::delete(paths::NOTIFICATIONS))
            .await;
        let refreshed = self.refresh().await;
        deleted?;
        refreshed?;
        Ok(())
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.state.lock().items.clone()
    }

    pub fn unread_count(&self) -> usize {
        NotificationRecord::unread_count(&self.state.lock().items)
    }

    pub fn reconciler_state(&self) -> ReconcilerState {
        self.state.lock().reconciler.state()
    }

    pub fn status(&self) -> LoaderStatus {
        self.loader.status()
    }
}

impl Drop for NotificationCenter {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::GestureKind;
    use crate::error::SyncError;
    use crate::pull::PullMethod;
    use crate::test_support::{settle, RecordingPlayer, ScriptedPull};
    use serde_json::json;

    struct Fixture {
        router: EventRouter,
        pull: Arc<ScriptedPull>,
        player: Arc<RecordingPlayer>,
        gate: AlertGate,
    }

    async fn fixture() -> Fixture {
        let player = Arc::new(RecordingPlayer::default());
        let gate = AlertGate::new(player.clone());
        gate.on_gesture(GestureKind::Click).await;
        Fixture {
            router: EventRouter::new(),
            pull: Arc::new(ScriptedPull::new()),
            player,
            gate,
        }
    }

    impl Fixture {
        fn mount(&self) -> NotificationCenter {
            NotificationCenter::mount(&self.router, self.pull.clone(), self.gate.clone())
        }
    }

    fn unread(ids: &[u32]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| {
                    json!({
                        "id": id.to_string(),
                        "title": "Leave update",
                        "message": "",
                        "isRead": false,
                        "createdAt": "2026-10-19T08:00:00Z"
                    })
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_poll_sequence_chimes_only_on_increase() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1])));
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        let center = f.mount();

        let first = center.refresh().await.unwrap().unwrap();
        assert!(!first.should_alert);
        assert_eq!(center.reconciler_state().last_unread_count, 1);

        let second = center.refresh().await.unwrap().unwrap();
        assert!(second.should_alert);
        assert_eq!(center.unread_count(), 2);

        let third = center.refresh().await.unwrap().unwrap();
        assert!(!third.should_alert);
        assert_eq!(f.player.plays(), 1);
    }

    #[tokio::test]
    async fn test_numeric_ids_from_server() {
        let f = fixture().await;
        f.pull.respond(
            paths::NOTIFICATIONS,
            Ok(json!([{"id": 1, "isRead": false, "createdAt": "2026-10-19T08:00:00Z"}])),
        );
        f.pull.respond(
            paths::NOTIFICATIONS,
            Ok(json!([
                {"id": 1, "isRead": false, "createdAt": "2026-10-19T08:00:00Z"},
                {"id": 2, "isRead": false, "createdAt": "2026-10-19T08:05:00Z"}
            ])),
        );
        f.pull.respond_to(
            PullMethod::Patch,
            &paths::notification_read("2"),
            Ok(Value::Null),
        );
        let center = f.mount();

        assert!(!center.refresh().await.unwrap().unwrap().should_alert);
        assert!(center.reconciler_state().initialized);
        assert!(center.refresh().await.unwrap().unwrap().should_alert);
        assert_eq!(center.notifications()[1].id, "2");
        assert_eq!(f.player.plays(), 1);

        center.mark_read("2").await.unwrap();
        assert_eq!(
            f.pull.requests()[2],
            PullRequest::patch("/notifications/2/read")
        );
    }

    #[tokio::test]
    async fn test_push_chimes_once_then_pulls() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1])));
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        let center = f.mount();
        center.refresh().await.unwrap();

        f.router.dispatch(Topic::NotificationNew, &json!({"id": "2"}));
        settle().await;

        assert_eq!(f.player.plays(), 1);
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 2);
        assert_eq!(center.unread_count(), 2);
        assert_eq!(center.reconciler_state().last_unread_count, 2);
    }

    #[tokio::test]
    async fn test_push_chimes_even_when_count_does_not_grow() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        let center = f.mount();
        center.refresh().await.unwrap();

        f.router.dispatch(Topic::NotificationNew, &Value::Null);
        settle().await;
        assert_eq!(f.player.plays(), 1);
    }

    #[tokio::test]
    async fn test_push_burst_coalesces_pulls() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1])));
        let hold = f.pull.hold();
        let center = f.mount();

        for _ in 0..3 {
            f.router.dispatch(Topic::NotificationNew, &Value::Null);
        }
        settle().await;
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 1);
        assert!(center.status().loading);

        f.pull.release();
        hold.notify_one();
        settle().await;
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 2);
        assert!(!center.status().loading);
        assert_eq!(f.player.plays(), 3);
    }

    #[tokio::test]
    async fn test_failed_pull_keeps_list() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        f.pull.respond(
            paths::NOTIFICATIONS,
            Err(SyncError::Http {
                path: paths::NOTIFICATIONS.to_string(),
                status: 503,
            }),
        );
        let center = f.mount();
        center.refresh().await.unwrap();

        assert!(center.refresh().await.is_err());
        assert_eq!(center.notifications().len(), 2);
        assert!(matches!(
            center.status().error,
            Some(SyncError::Http { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_mark_read_reconciles_with_server() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[2])));
        f.pull.respond_to(
            PullMethod::Patch,
            &paths::notification_read("1"),
            Ok(Value::Null),
        );
        let center = f.mount();
        center.refresh().await.unwrap();

        center.mark_read("1").await.unwrap();
        let requests = f.pull.requests();
        assert_eq!(requests[1], PullRequest::patch("/notifications/1/read"));
        assert_eq!(center.unread_count(), 1);
        assert_eq!(center.reconciler_state().last_unread_count, 1);
        assert_eq!(f.player.plays(), 0);
    }

    #[tokio::test]
    async fn test_mark_read_failure_changes_nothing() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1])));
        let center = f.mount();
        center.refresh().await.unwrap();

        // no scripted answer for the PATCH -> 404
        assert!(center.mark_read("1").await.is_err());
        assert_eq!(center.unread_count(), 1);
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        f.pull.respond(paths::NOTIFICATIONS, Ok(json!([])));
        f.pull.respond_to(
            PullMethod::Patch,
            paths::NOTIFICATIONS_READ_ALL,
            Ok(Value::Null),
        );
        let center = f.mount();
        center.refresh().await.unwrap();

        center.mark_all_read().await.unwrap();
        assert_eq!(center.unread_count(), 0);
        assert_eq!(center.reconciler_state().last_unread_count, 0);
    }

    #[tokio::test]
    async fn test_clear_all_restores_when_delete_fails() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        let center = f.mount();
        center.refresh().await.unwrap();

        assert!(center.clear_all().await.is_err());
        assert_eq!(center.notifications().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_all_empties_list() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1, 2])));
        f.pull.respond(paths::NOTIFICATIONS, Ok(json!([])));
        f.pull
            .respond_to(PullMethod::Delete, paths::NOTIFICATIONS, Ok(Value::Null));
        let center = f.mount();
        center.refresh().await.unwrap();

        center.clear_all().await.unwrap();
        assert!(center.notifications().is_empty());
        assert_eq!(center.unread_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_defers_first_pull() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1])));
        let mut center = f.mount();
        center.start_polling(Duration::from_millis(1000), Duration::from_secs(30));

        settle().await;
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        settle().await;
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 2);

        center.stop_polling();
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(f.pull.count(paths::NOTIFICATIONS), 2);
    }

    #[tokio::test]
    async fn test_unmount_revokes_subscription_and_ignores_late_response() {
        let f = fixture().await;
        f.pull.respond(paths::NOTIFICATIONS, Ok(unread(&[1])));
        let hold = f.pull.hold();
        let center = f.mount();
        assert_eq!(f.router.subscriber_count(Topic::NotificationNew), 1);

        f.router.dispatch(Topic::NotificationNew, &Value::Null);
        settle().await;
        drop(center);
        assert_eq!(f.router.subscriber_count(Topic::NotificationNew), 0);

        hold.notify_one();
        settle().await;
        assert_eq!(f.router.dispatch(Topic::NotificationNew, &Value::Null), 0);
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ViewSpec;
use crate::error::SyncResult;
use crate::pull::{pull_data, PullRequest, SharedPullClient};
use crate::refresh::{LoaderStatus, RefreshLoader};
use crate::router::{EventRouter, SubscriptionScope};

/// A pulled resource re-fetched whenever one of its topics fires.
///
/// Payloads are ignored; a push is only a trigger. On failure the last good
/// data stays in place.
pub struct LiveView<T> {
    spec: ViewSpec,
    data: Arc<Mutex<Option<T>>>,
    loader: RefreshLoader<T>,
    scope: SubscriptionScope,
}

impl<T> LiveView<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn mount(router: &EventRouter, pull: SharedPullClient, spec: ViewSpec) -> Self {
        let path = spec.path;
        let loader = RefreshLoader::new(spec.name, move || {
            let pull = pull.clone();
            async move { pull_data::<T>(pull.as_ref(), PullRequest::get(path)).await }
        });

        let data = Arc::new(Mutex::new(None));
        let mut scope = SubscriptionScope::new(spec.name, router);
        for &topic in spec.topics {
            let weak = Arc::downgrade(&data);
            let loader = loader.clone();
            scope.subscribe(topic, move |_: &Value| {
                loader.spawn_refresh(weak.clone(), |data: &mut Option<T>, fresh| {
                    *data = Some(fresh)
                });
            });
        }

        Self {
            spec,
            data,
            loader,
            scope,
        }
    }

    /// Returns false if nothing was applied because the view is gone.
    pub async fn refresh(&self) -> SyncResult<bool> {
        self.loader
            .run_into(&Arc::downgrade(&self.data), |data, fresh| *data = Some(fresh))
            .await
    }

    pub fn data(&self) -> Option<T> {
        self.data.lock().clone()
    }

    pub fn status(&self) -> LoaderStatus {
        self.loader.status()
    }

    pub fn fetch_count(&self) -> u64 {
        self.loader.fetch_count()
    }

    pub fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    pub fn subscription_count(&self) -> usize {
        self.scope.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::events::Topic;
    use crate::test_support::{settle, ScriptedPull};
    use crate::views::catalog;
    use serde_json::json;

    #[tokio::test]
    async fn test_topics_trigger_refresh() {
        let router = EventRouter::new();
        let pull = Arc::new(ScriptedPull::new());
        pull.respond(catalog::PROJECTS.path, Ok(json!([{"id": 1}])));
        pull.respond(catalog::PROJECTS.path, Ok(json!([{"id": 1}, {"id": 2}])));

        let view: LiveView<Value> = LiveView::mount(&router, pull.clone(), catalog::PROJECTS);
        assert_eq!(view.subscription_count(), 2);
        view.refresh().await.unwrap();
        assert_eq!(view.data(), Some(json!([{"id": 1}])));

        router.dispatch(Topic::ProjectUnassigned, &json!({"projectId": 2}));
        settle().await;
        assert_eq!(view.data(), Some(json!([{"id": 1}, {"id": 2}])));

        // unrelated topic
        router.dispatch(Topic::LeaveStatus, &Value::Null);
        settle().await;
        assert_eq!(view.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_burst_never_overlaps_fetches() {
        let router = EventRouter::new();
        let pull = Arc::new(ScriptedPull::new());
        pull.respond(catalog::PROJECTS.path, Ok(json!(["a"])));
        pull.respond(catalog::PROJECTS.path, Ok(json!(["a", "b"])));
        let hold = pull.hold();

        let view: LiveView<Value> = LiveView::mount(&router, pull.clone(), catalog::PROJECTS);
        for _ in 0..3 {
            router.dispatch(Topic::ProjectAssigned, &Value::Null);
        }
        settle().await;
        assert_eq!(pull.count(catalog::PROJECTS.path), 1);
        assert!(view.status().loading);

        pull.release();
        hold.notify_one();
        settle().await;

        assert_eq!(pull.count(catalog::PROJECTS.path), 2);
        assert!(!view.status().loading);
        assert_eq!(view.data(), Some(json!(["a", "b"])));
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_data() {
        let router = EventRouter::new();
        let pull = Arc::new(ScriptedPull::new());
        pull.respond(catalog::ATTENDANCE.path, Ok(json!({"present": 12})));
        pull.respond(
            catalog::ATTENDANCE.path,
            Err(SyncError::connection("reset by peer")),
        );

        let view: LiveView<Value> = LiveView::mount(&router, pull.clone(), catalog::ATTENDANCE);
        view.refresh().await.unwrap();
        router.dispatch(Topic::AttendanceCheckin, &Value::Null);
        settle().await;

        assert_eq!(view.data(), Some(json!({"present": 12})));
        assert!(view.status().error.is_some());
    }

    #[tokio::test]
    async fn test_drop_revokes_topics() {
        let router = EventRouter::new();
        let pull = Arc::new(ScriptedPull::new());
        let view: LiveView<Value> = LiveView::mount(&router, pull, catalog::DASHBOARD_STATS);
        assert_eq!(router.subscriber_count(Topic::LeaveCreated), 1);
        drop(view);
        for topic in catalog::DASHBOARD_STATS.topics {
            assert_eq!(router.subscriber_count(*topic), 0);
        }
    }
}

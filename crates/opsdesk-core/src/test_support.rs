//! Fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::alert::AlertPlayer;
use crate::error::{SyncError, SyncResult};
use crate::models::SecurityNotice;
use crate::pull::{PullClient, PullMethod, PullRequest};
use crate::views::NoticeSink;

/// Let spawned tasks on the current-thread runtime run to their next
/// suspension point.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Pull collaborator answering from per-(method, path) queues. The last
/// queued answer for a route is sticky; unscripted routes answer 404.
#[derive(Default)]
pub struct ScriptedPull {
    responses: Mutex<HashMap<(PullMethod, String), VecDeque<SyncResult<Value>>>>,
    requests: Mutex<Vec<PullRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedPull {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a GET answer
    pub fn respond(&self, path: &str, result: SyncResult<Value>) {
        self.respond_to(PullMethod::Get, path, result);
    }

    pub fn respond_to(&self, method: PullMethod, path: &str, result: SyncResult<Value>) {
        self.responses
            .lock()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(result);
    }

    /// Make every request wait for a `notify_one` on the returned handle.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn release(&self) {
        *self.gate.lock() = None;
    }

    pub fn requests(&self) -> Vec<PullRequest> {
        self.requests.lock().clone()
    }

    /// GET requests sent to `path`
    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == PullMethod::Get && r.path == path)
            .count()
    }

    fn answer(&self, request: &PullRequest) -> SyncResult<Value> {
        let path = request.path.as_str();
        let mut responses = self.responses.lock();
        match responses.get_mut(&(request.method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(Value::Null)),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(Value::Null)),
            None => Err(SyncError::Http {
                path: path.to_string(),
                status: 404,
            }),
        }
    }
}

impl PullClient for ScriptedPull {
    fn send(&self, request: PullRequest) -> BoxFuture<'_, SyncResult<Value>> {
        Box::pin(async move {
            self.requests.lock().push(request.clone());
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            self.answer(&request)
        })
    }
}

/// Alert player that fails its first `unlock_failures` unlock attempts.
#[derive(Default)]
pub struct RecordingPlayer {
    pub unlock_failures: AtomicUsize,
    pub unlock_attempts: AtomicUsize,
    pub plays: AtomicUsize,
}

impl RecordingPlayer {
    pub fn failing(times: usize) -> Self {
        Self {
            unlock_failures: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn unlock_attempts(&self) -> usize {
        self.unlock_attempts.load(Ordering::SeqCst)
    }
}

impl AlertPlayer for RecordingPlayer {
    fn unlock(&self) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.unlock_attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.unlock_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.unlock_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SyncError::alert_blocked("autoplay not allowed"));
            }
            Ok(())
        })
    }

    fn play(&self) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct NoticeCollector {
    pub notices: Mutex<Vec<SecurityNotice>>,
}

impl NoticeSink for NoticeCollector {
    fn show_blocking(&self, notice: SecurityNotice) {
        self.notices.lock().push(notice);
    }
}

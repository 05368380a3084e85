//! At-most-one-in-flight wrapper around an async fetch.
//!
//! Burst discipline is queue-one-pending with coalescing: while a fetch is
//! outstanding, further calls wait; once it settles, a single trailing
//! fetch runs and answers every call that arrived before it started. Three
//! back-to-back pushes therefore cost two fetches, and the last state a
//! view sees always comes from a fetch that started after the last push.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

pub type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<T>> + Send + Sync>;

/// Snapshot of a loader for rendering spinners and error banners
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderStatus {
    pub loading: bool,
    pub error: Option<SyncError>,
}

struct LoaderState<T> {
    /// Calls to `run` so far; each call takes the next ticket
    requested: u64,
    /// Highest ticket answered by a finished fetch
    settled: u64,
    last: Option<SyncResult<T>>,
    error: Option<SyncError>,
    /// `run` calls that have not returned yet
    active: usize,
    fetches: u64,
}

struct Inner<T> {
    name: &'static str,
    fetch: FetchFn<T>,
    /// Held for the duration of one fetch; tokio's mutex queues waiters FIFO
    turn: tokio::sync::Mutex<()>,
    state: Mutex<LoaderState<T>>,
}

/// Wraps one logical fetch (notifications, audit logs, projects, ...).
/// Loaders never share state with each other.
pub struct RefreshLoader<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RefreshLoader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for RefreshLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RefreshLoader")
            .field("name", &self.inner.name)
            .field("active", &state.active)
            .field("fetches", &state.fetches)
            .finish()
    }
}

/// Keeps `loading` raised for the lifetime of one `run` call, including
/// when the call errors or its future is dropped mid-flight.
struct ActiveGuard<'a, T> {
    state: &'a Mutex<LoaderState<T>>,
}

impl<'a, T> ActiveGuard<'a, T> {
    fn enter(state: &'a Mutex<LoaderState<T>>) -> (Self, u64) {
        let mut st = state.lock();
        st.active += 1;
        st.requested += 1;
        let ticket = st.requested;
        drop(st);
        (Self { state }, ticket)
    }
}

impl<T> Drop for ActiveGuard<'_, T> {
    fn drop(&mut self) {
        self.state.lock().active -= 1;
    }
}

impl<T> RefreshLoader<T>
where
    T: Clone + Send + 'static,
{
    pub fn new<F, Fut>(name: &'static str, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = SyncResult<T>> + Send + 'static,
    {
        let fetch: FetchFn<T> = Arc::new(move || Box::pin(fetch()));
        Self {
            inner: Arc::new(Inner {
                name,
                fetch,
                turn: tokio::sync::Mutex::new(()),
                state: Mutex::new(LoaderState {
                    requested: 0,
                    settled: 0,
                    last: None,
                    error: None,
                    active: 0,
                    fetches: 0,
                }),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Run the fetch, or join the pending trailing fetch if one is queued.
    ///
    /// Failures are stored in `error` and returned; nothing is retried.
    pub async fn run(&self) -> SyncResult<T> {
        let inner = &self.inner;
        let (_active, ticket) = ActiveGuard::enter(&inner.state);
        let _turn = inner.turn.lock().await;

        let covers = {
            let mut st = inner.state.lock();
            if st.settled >= ticket {
                if let Some(last) = st.last.clone() {
                    debug!(loader = inner.name, ticket, "coalesced into previous fetch");
                    return last;
                }
            }
            st.error = None;
            st.fetches += 1;
            st.requested
        };

        let result = (inner.fetch)().await;

        let mut st = inner.state.lock();
        st.settled = st.settled.max(covers);
        if let Err(e) = &result {
            warn!(loader = inner.name, "fetch failed: {}", e);
            st.error = Some(e.clone());
        }
        st.last = Some(result.clone());
        result
    }

    /// Run and hand a successful result to view state behind `target`.
    ///
    /// Returns `Ok(false)` when the view was torn down before the response
    /// arrived; the result is discarded. On error the target is untouched,
    /// so previously displayed data stays on screen.
    pub async fn run_into<S, A>(&self, target: &Weak<Mutex<S>>, apply: A) -> SyncResult<bool>
    where
        A: FnOnce(&mut S, T),
    {
        let value = self.run().await?;
        match target.upgrade() {
            Some(state) => {
                let mut guard = state.lock();
                apply(&mut *guard, value);
                Ok(true)
            }
            None => {
                debug!(loader = self.inner.name, "discarding late response");
                Ok(false)
            }
        }
    }

    /// Fire-and-forget `run_into`. Errors are already recorded in the
    /// loader, so the task just logs them.
    pub fn spawn_refresh<S, A>(&self, target: Weak<Mutex<S>>, apply: A) -> tokio::task::JoinHandle<()>
    where
        S: Send + 'static,
        A: FnOnce(&mut S, T) + Send + 'static,
    {
        let loader = self.clone();
        tokio::spawn(async move {
            if let Err(e) = loader.run_into(&target, apply).await {
                debug!(loader = loader.name(), "background refresh failed: {}", e);
            }
        })
    }

    pub fn loading(&self) -> bool {
        self.inner.state.lock().active > 0
    }

    pub fn error(&self) -> Option<SyncError> {
        self.inner.state.lock().error.clone()
    }

    pub fn status(&self) -> LoaderStatus {
        let st = self.inner.state.lock();
        LoaderStatus {
            loading: st.active > 0,
            error: st.error.clone(),
        }
    }

    /// Number of times the underlying fetch actually ran
    pub fn fetch_count(&self) -> u64 {
        self.inner.state.lock().fetches
    }
}

//! Audible alert gate.
//!
//! Platforms may refuse audio until the user interacts with the app. The
//! gate starts `Locked`, listens for the first click or key press, proves
//! playback works with a muted unlock, and only then lets chimes through.
//! While locked, chimes are dropped without error.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::SyncResult;

/// Platform seam for the alert asset.
pub trait AlertPlayer: Send + Sync {
    /// Muted, zero-volume play of the asset; on success pause, rewind to
    /// the start, unmute and restore the nominal volume. An error means
    /// playback is still blocked.
    fn unlock(&self) -> BoxFuture<'_, SyncResult<()>>;

    /// Play the asset once at the nominal volume.
    fn play(&self) -> BoxFuture<'_, SyncResult<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertGateState {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Click,
    KeyPress,
    Scroll,
    PointerMove,
}

impl GestureKind {
    /// Only activation gestures satisfy autoplay policies.
    pub fn is_activation(&self) -> bool {
        matches!(self, GestureKind::Click | GestureKind::KeyPress)
    }
}

pub type GestureHandler = Arc<dyn Fn(GestureKind) + Send + Sync>;

/// A live gesture listener. Dropping it removes the listener.
pub struct GestureRegistration {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl GestureRegistration {
    pub fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }
}

impl Drop for GestureRegistration {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl fmt::Debug for GestureRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GestureRegistration")
            .field("live", &self.remove.is_some())
            .finish()
    }
}

/// Where user input comes from (window events, a terminal, a test).
pub trait GestureSource {
    fn listen(&self, handler: GestureHandler) -> GestureRegistration;
}

/// In-process gesture source.
#[derive(Clone, Default)]
pub struct GestureBus {
    listeners: Arc<Mutex<GestureListeners>>,
}

#[derive(Default)]
struct GestureListeners {
    next_id: u64,
    handlers: HashMap<u64, GestureHandler>,
}

impl GestureBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, kind: GestureKind) {
        let handlers: Vec<GestureHandler> =
            self.listeners.lock().handlers.values().cloned().collect();
        for handler in handlers {
            handler(kind);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().handlers.len()
    }
}

impl GestureSource for GestureBus {
    fn listen(&self, handler: GestureHandler) -> GestureRegistration {
        let id = {
            let mut listeners = self.listeners.lock();
            listeners.next_id += 1;
            let id = listeners.next_id;
            listeners.handlers.insert(id, handler);
            id
        };
        let weak = Arc::downgrade(&self.listeners);
        GestureRegistration::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.lock().handlers.remove(&id);
            }
        })
    }
}

struct GateState {
    state: AlertGateState,
    unlocking: bool,
    listener: Option<GestureRegistration>,
}

struct GateInner {
    player: Arc<dyn AlertPlayer>,
    state: Mutex<GateState>,
}

/// Shared handle to the session's alert gate.
#[derive(Clone)]
pub struct AlertGate {
    inner: Arc<GateInner>,
}

impl fmt::Debug for AlertGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertGate")
            .field("state", &self.state())
            .finish()
    }
}

impl AlertGate {
    pub fn new(player: Arc<dyn AlertPlayer>) -> Self {
        Self {
            inner: Arc::new(GateInner {
                player,
                state: Mutex::new(GateState {
                    state: AlertGateState::Locked,
                    unlocking: false,
                    listener: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> AlertGateState {
        self.inner.state.lock().state
    }

    pub fn is_armed(&self) -> bool {
        self.inner.state.lock().listener.is_some()
    }

    /// Start listening for the unlocking gesture. No-op once unlocked or
    /// already armed.
    ///
    /// The listener holds only a weak reference to the gate; each qualifying
    /// gesture spawns an unlock attempt on the current tokio runtime.
    pub fn arm(&self, source: &dyn GestureSource) {
        {
            let st = self.inner.state.lock();
            if st.state == AlertGateState::Unlocked || st.listener.is_some() {
                return;
            }
        }

        let weak: Weak<GateInner> = Arc::downgrade(&self.inner);
        let registration = source.listen(Arc::new(move |kind: GestureKind| {
            if !kind.is_activation() {
                return;
            }
            if let Some(inner) = weak.upgrade() {
                let gate = AlertGate { inner };
                tokio::spawn(async move {
                    gate.on_gesture(kind).await;
                });
            }
        }));

        let mut st = self.inner.state.lock();
        if st.state == AlertGateState::Locked && st.listener.is_none() {
            st.listener = Some(registration);
            debug!("alert gate armed");
        }
    }

    /// Remove the gesture listener without unlocking.
    pub fn disarm(&self) {
        let listener = self.inner.state.lock().listener.take();
        if listener.is_some() {
            debug!("alert gate disarmed");
        }
    }

    /// Handle one user gesture. Attempts the muted unlock if still locked;
    /// a failed attempt leaves the gate locked for the next gesture.
    pub async fn on_gesture(&self, kind: GestureKind) -> AlertGateState {
        if !kind.is_activation() {
            return self.state();
        }
        {
            let mut st = self.inner.state.lock();
            if st.state == AlertGateState::Unlocked || st.unlocking {
                return st.state;
            }
            st.unlocking = true;
        }

        let result = self.inner.player.unlock().await;

        let listener = {
            let mut st = self.inner.state.lock();
            st.unlocking = false;
            match result {
                Ok(()) => {
                    st.state = AlertGateState::Unlocked;
                    info!(gesture = ?kind, "alert sound unlocked");
                    st.listener.take()
                }
                Err(e) => {
                    warn!(gesture = ?kind, "alert unlock failed, staying locked: {}", e);
                    None
                }
            }
        };
        // the registration removes itself outside the gate lock
        drop(listener);
        self.state()
    }

    /// Play the chime if unlocked. Returns whether anything was played.
    /// Locked gates and playback failures drop the chime silently.
    pub async fn play(&self) -> bool {
        if self.state() == AlertGateState::Locked {
            trace!("alert dropped, gate locked");
            return false;
        }
        match self.inner.player.play().await {
            Ok(()) => true,
            Err(e) => {
                debug!("alert playback failed: {}", e);
                false
            }
        }
    }
}

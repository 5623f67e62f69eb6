//! Reconnect timers.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::runtime::SessionInput;

/// One-shot timer owned by the session. Firing is reported back as
/// [`SessionInput::ReconnectDue`] (or driven by hand in tests).
pub trait Scheduler: Send {
    fn schedule(&mut self, delay: Duration);

    fn cancel(&mut self);
}

#[derive(Debug, Default)]
struct ManualState {
    requests: Vec<Duration>,
    armed: bool,
    cancellations: usize,
}

/// Records requests instead of sleeping. Clones share state, so a test can
/// keep one handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every delay ever scheduled, in order.
    pub fn requests(&self) -> Vec<Duration> {
        self.lock().requests.clone()
    }

    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    pub fn cancellations(&self) -> usize {
        self.lock().cancellations
    }

    /// Disarms the timer as if it had elapsed. Returns whether it was armed;
    /// the caller then feeds `on_reconnect_due` to the session.
    pub fn take_due(&self) -> bool {
        let mut state = self.lock();
        std::mem::replace(&mut state.armed, false)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration) {
        let mut state = self.lock();
        state.requests.push(delay);
        state.armed = true;
    }

    fn cancel(&mut self) {
        let mut state = self.lock();
        if state.armed {
            state.cancellations += 1;
        }
        state.armed = false;
    }
}

/// Sleeps on the runtime and posts `ReconnectDue` into the session channel.
pub struct TokioScheduler {
    events: UnboundedSender<SessionInput>,
    pending: Option<JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: UnboundedSender<SessionInput>) -> Self {
        Self {
            events,
            pending: None,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration) {
        self.cancel();
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if events.send(SessionInput::ReconnectDue).is_err() {
                debug!("Reconnect timer fired after session ended");
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

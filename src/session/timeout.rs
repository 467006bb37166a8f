//! Cancelable, resettable one-shot expiry timer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Slot {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
    /// Bumped on every start and cancel; a timer only fires for its own generation
    generation: u64,
}

/// At most one pending expiry per session
///
/// Cloning shares the same timer.
#[derive(Clone, Default)]
pub struct SessionTimeout {
    slot: Arc<Mutex<Slot>>,
    expired: Arc<AtomicBool>,
}

impl SessionTimeout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_expire` after `duration`, replacing any pending timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, on_expire: F, duration: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.slot.lock();
            if let Some(previous) = slot.token.take() {
                previous.cancel();
            }
            slot.generation += 1;
            slot.token = Some(token.clone());
            // Beyond the clock's range the timer never fires; so does the sleep.
            slot.deadline = Instant::now().checked_add(duration);
            self.expired.store(false, Ordering::SeqCst);
            slot.generation
        };

        let slot = Arc::clone(&self.slot);
        let expired = Arc::clone(&self.expired);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    {
                        let mut slot = slot.lock();
                        if slot.generation != generation {
                            return;
                        }
                        slot.token = None;
                        slot.deadline = None;
                        expired.store(true, Ordering::SeqCst);
                    }
                    tracing::debug!(after_ms = duration.as_millis() as u64, "Session timeout fired");
                    on_expire();
                }
            }
        });
    }

    /// Drop the pending timer without firing it
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        if let Some(token) = slot.token.take() {
            token.cancel();
            slot.generation += 1;
            slot.deadline = None;
            tracing::debug!("Session timeout cancelled");
        }
    }

    /// Restart the full window from now
    pub fn reset<F>(&self, on_expire: F, duration: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.start(on_expire, duration);
    }

    /// True only once a scheduled expiry has actually fired
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().token.is_some()
    }

    /// Time left before the pending timer fires; `None` when none is pending
    /// or the deadline lies beyond the clock's range
    pub fn remaining(&self) -> Option<Duration> {
        self.slot
            .lock()
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl std::fmt::Debug for SessionTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTimeout")
            .field("pending", &self.is_pending())
            .field("expired", &self.is_expired())
            .finish()
    }
}

//! Outbound alert rate limiting.
//!
//! A fixed window counter: at most `max_per_window` transmissions in any window of
//! `window_ms`. The window is persisted so a restart mid-window still honours the
//! envelope.
//!
//! Senders go through [`RateLimiter::acquire`]: the returned [`SendPermit`] holds
//! the send gate across the transmit, and only [`SendPermit::commit`] counts the
//! send. Concurrent responses and queue flushes therefore check, send and count
//! one at a time, and an alert parked in the offline queue is counted when it is
//! actually flushed.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::store::SettingsStore;

/// Persisted state of the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Clock time the window opened.
    pub window_start_ms: i64,
    /// Transmissions counted in this window.
    pub count: u32,
}

/// Fixed-window limiter over outbound alerts, shared by every sender.
pub struct RateLimiter {
    store: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    window_ms: i64,
    max_per_window: u32,
    state: Mutex<RateWindow>,
    /// Serializes check, transmit and count across all senders.
    send_gate: tokio::sync::Mutex<()>,
}

/// Exclusive right to send one alert. Dropping it without [`commit`](Self::commit)
/// leaves the window untouched.
pub struct SendPermit<'a> {
    limiter: &'a RateLimiter,
    _gate: tokio::sync::MutexGuard<'a, ()>,
}

impl SendPermit<'_> {
    /// The transport accepted the send; count it.
    pub fn commit(self) {
        self.limiter.record();
    }
}

impl RateLimiter {
    /// Restores the persisted window from `store`, or starts a fresh one.
    pub fn new(store: Arc<SettingsStore>, clock: Arc<dyn Clock>, window_ms: u64, max_per_window: u32) -> Self {
        let initial = match store.rate_window() {
            Ok(w) => w.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(target: "hfs::limiter", error = %e, "stored rate window unreadable; starting fresh");
                RateWindow::default()
            }
        };
        Self {
            store,
            clock,
            window_ms: window_ms as i64,
            max_per_window,
            state: Mutex::new(initial),
            send_gate: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RateWindow> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rolls an expired window over. Returns true when state changed.
    fn roll(&self, window: &mut RateWindow, now: i64) -> bool {
        if now - window.window_start_ms > self.window_ms {
            window.window_start_ms = now;
            window.count = 0;
            return true;
        }
        false
    }

    fn persist(&self, window: &RateWindow) {
        if let Err(e) = self.store.set_rate_window(window) {
            tracing::warn!(target: "hfs::limiter", error = %e, "failed to persist rate window");
        }
    }

    /// Whether another alert may be sent now.
    pub fn allow(&self) -> bool {
        let now = self.clock.now_ms();
        let mut window = self.lock();
        if self.roll(&mut window, now) {
            self.persist(&window);
        }
        let allowed = window.count < self.max_per_window;
        if !allowed {
            tracing::debug!(
                target: "hfs::limiter",
                count = window.count,
                max = self.max_per_window,
                "alert window exhausted"
            );
        }
        allowed
    }

    /// Counts one completed transmission.
    pub fn record(&self) {
        let now = self.clock.now_ms();
        let mut window = self.lock();
        self.roll(&mut window, now);
        window.count = window.count.saturating_add(1);
        self.persist(&window);
    }

    /// Waits for the send gate, then checks the window. `None` when exhausted.
    pub async fn acquire(&self) -> Option<SendPermit<'_>> {
        let gate = self.send_gate.lock().await;
        if !self.allow() {
            return None;
        }
        Some(SendPermit {
            limiter: self,
            _gate: gate,
        })
    }

    /// Current window without rolling it.
    pub fn snapshot(&self) -> RateWindow {
        *self.lock()
    }
}

//! Lock session state machine.
//!
//! One [`LockSession`] per process holds the unlocked context, its grace window,
//! whether a lock surface is showing, and the system-surface failure watcher.
//! Every read-modify-write happens under a single mutex so a grant and a
//! concurrent foreground check can never interleave.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::EngineConfig;

/// Synthetic context used when a screen wake pre-emptively locks the device.
pub const PHONE_LOCK_CONTEXT: &str = "System Phone Lock";

/// Identifies one lock presentation. Monotonic per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresentationId(pub u64);

impl fmt::Display for PresentationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the session stands after the last foreground change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Foreground context is not protected.
    Unarmed,
    /// Protected context inside its grace window.
    ArmedTrusted,
    /// Protected context without grace; a lock was requested.
    ArmedUntrusted,
    /// Our own lock surface is in the foreground.
    LockPresented,
}

/// Result of feeding one foreground change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: LockState,
    /// Set when the caller must present the authentication surface.
    pub lock_request: Option<PresentationId>,
}

impl Transition {
    fn settled(state: LockState) -> Self {
        Self {
            state,
            lock_request: None,
        }
    }
}

#[derive(Debug, Default)]
struct SystemWatcher {
    streak: u32,
    last_alert_ms: Option<i64>,
}

#[derive(Debug)]
struct SessionInner {
    lock_presented: bool,
    unlocked_context: Option<String>,
    unlocked_at_ms: Option<i64>,
    presentation: u64,
    state: LockState,
    watcher: SystemWatcher,
}

/// Point-in-time copy of the session, taken under its lock.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: LockState,
    /// A lock surface is showing or was requested and not yet dismissed.
    pub lock_presented: bool,
    /// Context the owner last unlocked, while its grace has not been revoked.
    pub unlocked_context: Option<String>,
    /// Consecutive failed attempts seen on the system surface.
    pub failed_attempt_streak: u32,
}

/// Shared lock session. All updates go through one mutex.
pub struct LockSession {
    clock: Arc<dyn Clock>,
    grace_ms: i64,
    cooldown_ms: i64,
    failure_threshold: u32,
    own_surface_id: String,
    system_surface_id: String,
    launcher_id: Option<String>,
    inner: Mutex<SessionInner>,
}

impl LockSession {
    /// Unarmed session with no grace and no presentation yet.
    pub fn new(config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            grace_ms: config.grace_ms as i64,
            cooldown_ms: config.system_cooldown_ms as i64,
            failure_threshold: config.system_failure_threshold.max(1),
            own_surface_id: config.own_surface_id.clone(),
            system_surface_id: config.system_auth_surface_id.clone(),
            launcher_id: config.launcher_id.clone(),
            inner: Mutex::new(SessionInner {
                lock_presented: false,
                unlocked_context: None,
                unlocked_at_ms: None,
                presentation: 0,
                state: LockState::Unarmed,
                watcher: SystemWatcher::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_home(&self, context: &str) -> bool {
        self.launcher_id.as_deref() == Some(context) || context.to_lowercase().contains("launcher")
    }

    pub fn is_system_surface(&self, context: &str) -> bool {
        context == self.system_surface_id
    }

    fn request_lock(inner: &mut SessionInner) -> Transition {
        inner.presentation += 1;
        inner.lock_presented = true;
        inner.state = LockState::ArmedUntrusted;
        Transition {
            state: LockState::ArmedUntrusted,
            lock_request: Some(PresentationId(inner.presentation)),
        }
    }

    /// Feeds a foreground change.
    pub fn on_foreground(&self, context: &str, protected: &BTreeSet<String>) -> Transition {
        let now = self.clock.now_ms();
        let mut inner = self.lock();

        if !self.is_system_surface(context) {
            inner.watcher.streak = 0;
        }

        if self.is_home(context) {
            inner.lock_presented = false;
        }

        if context == self.own_surface_id {
            inner.lock_presented = true;
            inner.state = LockState::LockPresented;
            return Transition::settled(LockState::LockPresented);
        }

        let is_unlocked_context = inner.unlocked_context.as_deref() == Some(context);
        if inner.lock_presented && is_unlocked_context {
            return Transition::settled(inner.state);
        }

        if !is_unlocked_context && inner.unlocked_context.take().is_some() {
            inner.unlocked_at_ms = None;
            tracing::debug!(target: "hfs::session", context = %context, "context switched; grace revoked");
        }

        if !protected.contains(context) {
            inner.state = LockState::Unarmed;
            return Transition::settled(LockState::Unarmed);
        }

        let grace_valid = inner.unlocked_context.as_deref() == Some(context)
            && inner.unlocked_at_ms.is_some_and(|at| now - at < self.grace_ms);
        if grace_valid {
            inner.state = LockState::ArmedTrusted;
            return Transition::settled(LockState::ArmedTrusted);
        }

        let transition = Self::request_lock(&mut inner);
        tracing::info!(
            target: "hfs::session",
            context = %context,
            presentation = ?transition.lock_request,
            "protected context without grace; locking"
        );
        transition
    }

    /// Screen woke. Requests a phone lock when protection is enabled.
    pub fn on_screen_wake(&self, phone_protection: bool) -> Option<PresentationId> {
        if !phone_protection {
            return None;
        }
        let mut inner = self.lock();
        let transition = Self::request_lock(&mut inner);
        tracing::info!(target: "hfs::session", context = PHONE_LOCK_CONTEXT, "screen wake; pre-emptive lock");
        transition.lock_request
    }

    /// Owner verified for `context`: start its grace window.
    pub fn grant_grace(&self, context: &str) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        inner.unlocked_context = Some(context.to_string());
        inner.unlocked_at_ms = Some(now);
        inner.lock_presented = false;
        inner.state = LockState::ArmedTrusted;
        tracing::info!(target: "hfs::session", context = %context, "owner verified; grace started");
    }

    /// Whether `context` is inside a valid grace window right now.
    pub fn is_trusted(&self, context: &str) -> bool {
        let now = self.clock.now_ms();
        let inner = self.lock();
        inner.unlocked_context.as_deref() == Some(context)
            && inner.unlocked_at_ms.is_some_and(|at| now - at < self.grace_ms)
    }

    /// Current presentation counter (0 before the first lock).
    pub fn current_presentation(&self) -> PresentationId {
        PresentationId(self.lock().presentation)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: inner.state,
            lock_presented: inner.lock_presented,
            unlocked_context: inner.unlocked_context.clone(),
            failed_attempt_streak: inner.watcher.streak,
        }
    }

    // --- system authentication surface watcher ---------------------------

    /// Explicit failure text on the system surface. Counts as a full streak.
    pub fn on_system_failure_text(&self) -> bool {
        let mut inner = self.lock();
        inner.watcher.streak = self.failure_threshold;
        self.evaluate_streak(&mut inner)
    }

    /// A raw click on the system surface.
    pub fn on_system_click(&self) -> bool {
        let mut inner = self.lock();
        inner.watcher.streak = inner.watcher.streak.saturating_add(1);
        self.evaluate_streak(&mut inner)
    }

    /// The system surface reported success.
    pub fn on_system_success(&self) {
        self.lock().watcher.streak = 0;
    }

    /// True when the caller should start a system-surface breach response.
    fn evaluate_streak(&self, inner: &mut SessionInner) -> bool {
        if inner.watcher.streak < self.failure_threshold {
            return false;
        }
        inner.watcher.streak = 0;
        let now = self.clock.now_ms();
        let cooled = inner
            .watcher
            .last_alert_ms
            .map_or(true, |last| now - last > self.cooldown_ms);
        if cooled {
            inner.watcher.last_alert_ms = Some(now);
            tracing::warn!(target: "hfs::session", "system surface failure threshold reached");
        } else {
            tracing::debug!(target: "hfs::session", "system surface failure within cooldown");
        }
        cooled
    }
}

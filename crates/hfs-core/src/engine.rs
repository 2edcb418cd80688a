//! Guardian runtime: owns the shared lock session, wires every component, and
//! runs the event loop.
//!
//! The loop only does bookkeeping inline (session transitions, surface
//! presentation). Breach responses, watchdog checks and owner verification are
//! spawned so a slow collaborator never stalls foreground tracking. `stop()`
//! waits for those in-flight tasks: an alert already in motion is never cancelled.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::alert::BreachReason;
use crate::channel::{AlertRouter, AlertTransmitter, ChannelProvider};
use crate::clock::Clock;
use crate::collaborators::{
    AlwaysOnline, Connectivity, EvidenceCamera, EvidenceUploader, IdentityVerifier, LocationResolver, Presenter,
    RadioSettings, UploadRetryQueue,
};
use crate::config::EngineConfig;
use crate::crypto::SecretCipher;
use crate::error::{GuardError, StoreError};
use crate::monitor::{ForegroundMonitor, MonitorSignal, RawWindowEvent};
use crate::orchestrator::{BreachOrchestrator, BreachRequest, Evidence};
use crate::queue::OfflineQueue;
use crate::rate_limiter::RateLimiter;
use crate::session::{LockSession, PresentationId, PHONE_LOCK_CONTEXT};
use crate::store::SettingsStore;
use crate::vault::TamperVault;
use crate::verification::OwnerVerification;
use crate::watchdog::{HardwareIdentityWatchdog, RadioKillWatchdog};

const EVENT_QUEUE_DEPTH: usize = 256;

/// Target label for breaches on the operating system's own lock.
pub const SYSTEM_LOCK_TARGET: &str = "SYSTEM PHONE LOCK";
/// Target label for device-admin password failures.
pub const DEVICE_ADMIN_TARGET: &str = "PHONE LOCK SCREEN";

/// Inputs to the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GuardEvent {
    Window(RawWindowEvent),
    ScreenOn,
    /// Platform broadcast that the radio was switched off.
    RadioSignal,
    /// Platform broadcast that the hardware channel set changed.
    IdentitySetChanged,
    /// The authentication surface is up for `presentation`; verify the owner.
    VerifyOwner {
        context: String,
        presentation: PresentationId,
    },
    /// Owner authenticated by other means (PIN on our surface).
    GrantGrace { context: String },
    /// The system lock reported a successful unlock.
    SystemUnlocked,
    /// Device-admin reported a failed device password.
    DevicePasswordFailed,
}

/// Platform capabilities handed to [`Guardian::assemble`].
pub struct Collaborators {
    pub channels: Arc<dyn ChannelProvider>,
    pub transmitter: Arc<dyn AlertTransmitter>,
    pub presenter: Arc<dyn Presenter>,
    pub radio: Arc<dyn RadioSettings>,
    pub connectivity: Arc<dyn Connectivity>,
    pub camera: Option<Arc<dyn EvidenceCamera>>,
    pub verifier: Option<Arc<dyn IdentityVerifier>>,
    pub uploader: Option<(Arc<dyn EvidenceUploader>, Arc<dyn UploadRetryQueue>)>,
    pub location: Option<Arc<dyn LocationResolver>>,
}

impl Collaborators {
    pub fn new(
        channels: Arc<dyn ChannelProvider>,
        transmitter: Arc<dyn AlertTransmitter>,
        presenter: Arc<dyn Presenter>,
        radio: Arc<dyn RadioSettings>,
    ) -> Self {
        Self {
            channels,
            transmitter,
            presenter,
            radio,
            connectivity: Arc::new(AlwaysOnline),
            camera: None,
            verifier: None,
            uploader: None,
            location: None,
        }
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_camera(mut self, camera: Arc<dyn EvidenceCamera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn IdentityVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn EvidenceUploader>, retry: Arc<dyn UploadRetryQueue>) -> Self {
        self.uploader = Some((uploader, retry));
        self
    }

    pub fn with_location(mut self, location: Arc<dyn LocationResolver>) -> Self {
        self.location = Some(location);
        self
    }
}

struct Core {
    store: Arc<SettingsStore>,
    cipher: Arc<dyn SecretCipher>,
    channels: Arc<dyn ChannelProvider>,
    presenter: Arc<dyn Presenter>,
    session: Arc<LockSession>,
    monitor: ForegroundMonitor,
    orchestrator: Arc<BreachOrchestrator>,
    queue: Arc<OfflineQueue>,
    vault: Arc<TamperVault>,
    radio_watchdog: Arc<RadioKillWatchdog>,
    identity_watchdog: Arc<HardwareIdentityWatchdog>,
    verification: Option<Arc<OwnerVerification>>,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl Core {
    fn track(&self, handle: JoinHandle<()>) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        inflight.retain(|h| !h.is_finished());
        inflight.push(handle);
    }

    fn take_inflight(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.inflight.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn spawn_response(&self, request: BreachRequest) {
        let orchestrator = Arc::clone(&self.orchestrator);
        self.track(tokio::spawn(async move {
            orchestrator.respond(request).await;
        }));
    }

    fn system_surface_breach(&self) {
        self.spawn_response(
            BreachRequest::new(BreachReason::SystemSurface, SYSTEM_LOCK_TARGET).with_evidence(Evidence::CaptureNow),
        );
    }

    fn on_foreground(&self, context: &str) {
        let protected = self.store.protected_contexts().unwrap_or_else(|e| {
            tracing::warn!(target: "hfs::guardian", error = %e, "protected contexts unreadable");
            Default::default()
        });
        let transition = self.session.on_foreground(context, &protected);
        if let Some(presentation) = transition.lock_request {
            self.presenter.present_authentication_surface(context, presentation);
        }
    }

    fn dispatch(&self, event: GuardEvent) {
        match event {
            GuardEvent::Window(raw) => {
                for signal in self.monitor.normalize(&raw) {
                    match signal {
                        MonitorSignal::ForegroundChanged(context) => self.on_foreground(&context),
                        MonitorSignal::AuthSurfaceFailureText => {
                            if self.session.on_system_failure_text() {
                                self.system_surface_breach();
                            }
                        }
                        MonitorSignal::AuthSurfaceClick => {
                            if self.session.on_system_click() {
                                self.system_surface_breach();
                            }
                        }
                    }
                }
            }
            GuardEvent::ScreenOn => {
                let protection = self.store.phone_protection_enabled().unwrap_or_else(|e| {
                    tracing::warn!(target: "hfs::guardian", error = %e, "phone protection flag unreadable");
                    true
                });
                if let Some(presentation) = self.session.on_screen_wake(protection) {
                    self.presenter.present_authentication_surface(PHONE_LOCK_CONTEXT, presentation);
                }
            }
            GuardEvent::RadioSignal => {
                let watchdog = Arc::clone(&self.radio_watchdog);
                self.track(tokio::spawn(async move {
                    let outcome = watchdog.on_radio_signal().await;
                    tracing::debug!(target: "hfs::guardian", outcome = ?outcome, "radio signal handled");
                }));
            }
            GuardEvent::IdentitySetChanged => {
                let watchdog = Arc::clone(&self.identity_watchdog);
                self.track(tokio::spawn(async move {
                    let report = watchdog.on_identity_set_changed().await;
                    tracing::debug!(target: "hfs::guardian", report = ?report, "identity change handled");
                }));
            }
            GuardEvent::VerifyOwner { context, presentation } => match self.verification.as_ref() {
                Some(verification) => {
                    let verification = Arc::clone(verification);
                    self.track(tokio::spawn(async move {
                        let result = verification.attempt(&context, presentation).await;
                        tracing::debug!(target: "hfs::guardian", %presentation, result = ?result, "verification finished");
                    }));
                }
                None => {
                    tracing::warn!(target: "hfs::guardian", %presentation, "no camera/verifier configured; verification skipped");
                }
            },
            GuardEvent::GrantGrace { context } => self.session.grant_grace(&context),
            GuardEvent::SystemUnlocked => self.session.on_system_success(),
            GuardEvent::DevicePasswordFailed => {
                self.spawn_response(BreachRequest::new(BreachReason::SystemSurface, DEVICE_ADMIN_TARGET));
            }
        }
    }
}

/// Cloneable sender into a guardian's event loop.
#[derive(Clone)]
pub struct GuardHandle {
    tx: mpsc::Sender<GuardEvent>,
}

impl GuardHandle {
    pub async fn send(&self, event: GuardEvent) -> Result<(), GuardError> {
        self.tx.send(event).await.map_err(|_| GuardError::LoopClosed)
    }
}

struct Running {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<mpsc::Receiver<GuardEvent>>,
}

/// Owns every component and the event loop that feeds them.
pub struct Guardian {
    core: Arc<Core>,
    events_tx: mpsc::Sender<GuardEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<GuardEvent>>>,
    running: Mutex<Option<Running>>,
}

impl Guardian {
    /// Wires the components around one shared session, limiter and queue. Does not start the loop.
    pub fn assemble(
        config: &EngineConfig,
        store: Arc<SettingsStore>,
        cipher: Arc<dyn SecretCipher>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            channels,
            transmitter,
            presenter,
            radio,
            connectivity,
            camera,
            verifier,
            uploader,
            location,
        } = collaborators;

        let session = Arc::new(LockSession::new(config, Arc::clone(&clock)));
        let limiter = Arc::new(RateLimiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.rate_window_ms,
            config.rate_max_per_window,
        ));
        let router = Arc::new(AlertRouter::new(
            Arc::clone(&channels),
            transmitter,
            Arc::clone(&store),
            Arc::clone(&cipher),
            config.default_country_code.clone(),
            config.segment_char_limit,
        )
        .with_send_timeout(config.send_timeout()));
        let queue = Arc::new(OfflineQueue::new(
            Arc::clone(&store),
            Arc::clone(&router),
            Arc::clone(&limiter),
            Arc::clone(&clock),
        ));

        let mut orchestrator = BreachOrchestrator::new(
            router,
            limiter,
            Arc::clone(&queue),
            Arc::clone(&store),
            clock,
            connectivity,
        )
        .with_evidence_timeouts(config.capture_timeout(), config.upload_timeout());
        if let Some(camera) = camera.as_ref() {
            orchestrator = orchestrator.with_camera(Arc::clone(camera));
        }
        if let Some((uploader, retry)) = uploader {
            orchestrator = orchestrator.with_uploader(uploader, retry);
        }
        if let Some(location) = location {
            orchestrator = orchestrator.with_location(location, config.location_timeout());
        }
        let orchestrator = Arc::new(orchestrator);

        let vault = Arc::new(TamperVault::new(Arc::clone(&store), Arc::clone(&cipher)));
        let radio_watchdog = Arc::new(RadioKillWatchdog::new(
            Arc::clone(&store),
            radio,
            Arc::clone(&presenter),
            Arc::clone(&orchestrator),
        ));
        let identity_watchdog = Arc::new(HardwareIdentityWatchdog::new(
            Arc::clone(&store),
            Arc::clone(&channels),
            Arc::clone(&vault),
            Arc::clone(&queue),
            Arc::clone(&presenter),
            Arc::clone(&orchestrator),
        ));
        let verification = match (camera, verifier) {
            (Some(camera), Some(verifier)) => Some(Arc::new(OwnerVerification::new(
                Arc::clone(&session),
                camera,
                verifier,
                Arc::clone(&orchestrator),
                config.verification_timeout(),
            )
            .with_capture_timeout(config.capture_timeout()))),
            _ => None,
        };

        let core = Arc::new(Core {
            store,
            cipher,
            channels,
            presenter,
            session,
            monitor: ForegroundMonitor::new(config.system_auth_surface_id.clone()),
            orchestrator,
            queue,
            vault,
            radio_watchdog,
            identity_watchdog,
            verification,
            inflight: Mutex::new(Vec::new()),
        });

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        Self {
            core,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Starts the event loop. Returns `false` when it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running();
        if running.is_some() {
            return false;
        }
        let Some(events) = self.events_rx.lock().unwrap_or_else(|p| p.into_inner()).take() else {
            return false;
        };
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(run(Arc::clone(&self.core), events, shutdown_rx));
        *running = Some(Running { shutdown, task });
        tracing::info!(target: "hfs::guardian", "guardian started");
        true
    }

    /// Stops the loop after it has handled every event already accepted, then
    /// waits for in-flight responses. Returns `false` when not running.
    pub async fn stop(&self) -> bool {
        let running = self.running().take();
        let Some(Running { shutdown, task }) = running else {
            return false;
        };
        let _ = shutdown.send(()).await;
        match task.await {
            Ok(events) => {
                let mut slot = self.events_rx.lock().unwrap_or_else(|p| p.into_inner());
                *slot = Some(events);
            }
            Err(e) => tracing::error!(target: "hfs::guardian", error = %e, "event loop ended abnormally"),
        }
        self.settle().await;
        tracing::info!(target: "hfs::guardian", "guardian stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }

    /// Sender for events; valid across restarts.
    pub fn handle(&self) -> GuardHandle {
        GuardHandle {
            tx: self.events_tx.clone(),
        }
    }

    /// Waits for every spawned response, watchdog check and verification.
    pub async fn settle(&self) {
        loop {
            let pending = self.core.take_inflight();
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::error!(target: "hfs::guardian", error = %e, "background task failed");
                }
            }
        }
    }

    pub fn session(&self) -> &Arc<LockSession> {
        &self.core.session
    }

    pub fn store(&self) -> &Arc<SettingsStore> {
        &self.core.store
    }

    pub fn offline_queue(&self) -> &Arc<OfflineQueue> {
        &self.core.queue
    }

    /// Records the currently inserted channels as trusted.
    pub fn mark_current_channels_trusted(&self) -> Result<usize, GuardError> {
        self.core.vault.scan_current_as_trusted(self.core.channels.as_ref())
    }

    /// Seals and stores the emergency number.
    pub fn set_emergency_number(&self, number: &str) -> Result<(), GuardError> {
        let sealed = self.core.cipher.encrypt(number.trim()).map_err(StoreError::from)?;
        self.core.store.set_emergency_number_sealed(&sealed)?;
        Ok(())
    }
}

async fn run(
    core: Arc<Core>,
    mut events: mpsc::Receiver<GuardEvent>,
    mut shutdown: mpsc::Receiver<()>,
) -> mpsc::Receiver<GuardEvent> {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                while let Ok(event) = events.try_recv() {
                    core.dispatch(event);
                }
                break;
            }
            event = events.recv() => match event {
                Some(event) => core.dispatch(event),
                None => break,
            },
        }
    }
    events
}

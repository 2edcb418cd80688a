//! Shared fakes for the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hfs_core::{
    AesGcmCipher, AlertRouter, AlertTransmitter, BreachOrchestrator, BreachReason, ChannelError, ChannelIdentity,
    ChannelProvider, CollaboratorError, Collaborators, Connectivity, EngineConfig, EvidenceCamera, EvidenceUploader,
    Guardian, IdentityVerdict, IdentityVerifier, LocationResolver, ManualClock, OfflineQueue, PresentationId,
    Presenter, RadioSettings, RateLimiter, SecretCipher, SettingsStore, TransmitError, UploadRetryQueue,
};

pub const EMERGENCY: &str = "9876543210";

pub fn test_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    for (i, b) in key.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(7).wrapping_add(42);
    }
    key
}

pub fn ch(slot: u8, id: &str) -> ChannelIdentity {
    ChannelIdentity::new(slot, id)
}

// --- channels -------------------------------------------------------------

pub struct FakeChannels(Mutex<Result<Vec<ChannelIdentity>, ChannelError>>);

impl FakeChannels {
    pub fn new(live: Vec<ChannelIdentity>) -> Self {
        Self(Mutex::new(Ok(live)))
    }

    pub fn set(&self, live: Vec<ChannelIdentity>) {
        *self.0.lock().unwrap() = Ok(live);
    }

    pub fn deny(&self) {
        *self.0.lock().unwrap() = Err(ChannelError::PermissionDenied);
    }
}

impl ChannelProvider for FakeChannels {
    fn active_channels(&self) -> Result<Vec<ChannelIdentity>, ChannelError> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub slot: u8,
    pub recipient: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingTransmitter {
    pub sent: Mutex<Vec<Sent>>,
    pub fail: AtomicBool,
    /// Simulated transport latency.
    pub delay_ms: AtomicU64,
}

impl RecordingTransmitter {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_body(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|s| s.body.clone())
    }
}

#[async_trait]
impl AlertTransmitter for RecordingTransmitter {
    async fn send(&self, channel: &ChannelIdentity, recipient: &str, segments: &[String]) -> Result<(), TransmitError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransmitError::Rejected("radio busy".into()));
        }
        self.sent.lock().unwrap().push(Sent {
            slot: channel.slot,
            recipient: recipient.to_string(),
            body: segments.concat(),
        });
        Ok(())
    }
}

// --- surfaces and radio ---------------------------------------------------

#[derive(Default)]
pub struct RecordingPresenter {
    pub auth: Mutex<Vec<(String, PresentationId)>>,
    pub lockdowns: Mutex<Vec<BreachReason>>,
}

impl Presenter for RecordingPresenter {
    fn present_authentication_surface(&self, target: &str, presentation: PresentationId) {
        self.auth.lock().unwrap().push((target.to_string(), presentation));
    }

    fn present_lockdown_surface(&self, reason: BreachReason) {
        self.lockdowns.lock().unwrap().push(reason);
    }
}

#[derive(Default)]
pub struct FakeRadio(pub AtomicBool);

impl RadioSettings for FakeRadio {
    fn radio_disabled(&self) -> Result<bool, CollaboratorError> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

pub struct Online(pub AtomicBool);

impl Connectivity for Online {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// --- evidence -------------------------------------------------------------

pub struct FakeCamera {
    pub fail: AtomicBool,
    pub shots: AtomicUsize,
}

impl Default for FakeCamera {
    fn default() -> Self {
        Self {
            fail: AtomicBool::new(false),
            shots: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EvidenceCamera for FakeCamera {
    async fn capture(&self) -> Result<PathBuf, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("camera", "busy"));
        }
        let n = self.shots.fetch_add(1, Ordering::SeqCst);
        Ok(PathBuf::from(format!("/evidence/shot-{}.jpg", n)))
    }
}

pub struct FakeVerifier {
    pub verdict: IdentityVerdict,
    pub delay: Duration,
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, _sample: &Path) -> Result<IdentityVerdict, CollaboratorError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.verdict)
    }
}

pub struct FakeLocation(pub Result<String, CollaboratorError>, pub Duration);

#[async_trait]
impl LocationResolver for FakeLocation {
    async fn resolve(&self) -> Result<String, CollaboratorError> {
        tokio::time::sleep(self.1).await;
        self.0.clone()
    }
}

#[derive(Default)]
pub struct FakeUploader {
    pub fail: AtomicBool,
}

#[async_trait]
impl EvidenceUploader for FakeUploader {
    async fn upload(&self, file: &Path) -> Result<String, CollaboratorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("uploader", "quota exceeded"));
        }
        Ok(format!("https://drive.example/{}", file.display()))
    }
}

/// Camera that never returns a frame.
pub struct StalledCamera;

#[async_trait]
impl EvidenceCamera for StalledCamera {
    async fn capture(&self) -> Result<PathBuf, CollaboratorError> {
        std::future::pending().await
    }
}

/// Uploader that never answers.
pub struct StalledUploader;

#[async_trait]
impl EvidenceUploader for StalledUploader {
    async fn upload(&self, _file: &Path) -> Result<String, CollaboratorError> {
        std::future::pending().await
    }
}

#[derive(Default)]
pub struct FakeRetry(pub Mutex<Vec<PathBuf>>);

impl UploadRetryQueue for FakeRetry {
    fn enqueue(&self, file: &Path) -> Result<(), CollaboratorError> {
        self.0.lock().unwrap().push(file.to_path_buf());
        Ok(())
    }
}

// --- harness --------------------------------------------------------------

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub config: EngineConfig,
    pub store: Arc<SettingsStore>,
    pub cipher: Arc<AesGcmCipher>,
    pub clock: Arc<ManualClock>,
    pub channels: Arc<FakeChannels>,
    pub transmitter: Arc<RecordingTransmitter>,
    pub presenter: Arc<RecordingPresenter>,
    pub radio: Arc<FakeRadio>,
    pub camera: Arc<FakeCamera>,
    pub online: Arc<Online>,
    pub uploader: Arc<FakeUploader>,
    pub retry: Arc<FakeRetry>,
}

impl Harness {
    pub fn new(live: Vec<ChannelIdentity>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SettingsStore::open_path(dir.path().join("hfs")).unwrap());
        let cipher = Arc::new(AesGcmCipher::new(Some(&test_key())));
        store
            .set_emergency_number_sealed(&cipher.encrypt(EMERGENCY).unwrap())
            .unwrap();
        Self {
            dir,
            config: EngineConfig {
                launcher_id: Some("com.home".into()),
                ..EngineConfig::default()
            },
            store,
            cipher,
            clock: Arc::new(ManualClock::new(1_700_000_000_000)),
            channels: Arc::new(FakeChannels::new(live)),
            transmitter: Arc::new(RecordingTransmitter::default()),
            presenter: Arc::new(RecordingPresenter::default()),
            radio: Arc::new(FakeRadio::default()),
            camera: Arc::new(FakeCamera::default()),
            online: Arc::new(Online(AtomicBool::new(true))),
            uploader: Arc::new(FakeUploader::default()),
            retry: Arc::new(FakeRetry::default()),
        }
    }

    pub fn router(&self) -> Arc<AlertRouter> {
        Arc::new(AlertRouter::new(
            self.channels.clone(),
            self.transmitter.clone(),
            self.store.clone(),
            self.cipher.clone(),
            self.config.default_country_code.clone(),
            self.config.segment_char_limit,
        ))
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(
            self.store.clone(),
            self.clock.clone(),
            self.config.rate_window_ms,
            self.config.rate_max_per_window,
        ))
    }

    /// Pipeline pieces sharing one router and limiter.
    pub fn pipeline(&self) -> (Arc<OfflineQueue>, BreachOrchestrator) {
        let router = self.router();
        let limiter = self.limiter();
        let queue = Arc::new(OfflineQueue::new(
            self.store.clone(),
            router.clone(),
            limiter.clone(),
            self.clock.clone(),
        ));
        let orchestrator = BreachOrchestrator::new(
            router,
            limiter,
            queue.clone(),
            self.store.clone(),
            self.clock.clone(),
            self.online.clone(),
        )
        .with_camera(self.camera.clone())
        .with_uploader(self.uploader.clone(), self.retry.clone());
        (queue, orchestrator)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.channels.clone(),
            self.transmitter.clone(),
            self.presenter.clone(),
            self.radio.clone(),
        )
        .with_connectivity(self.online.clone())
        .with_camera(self.camera.clone())
    }

    pub fn guardian(&self, collaborators: Collaborators) -> Guardian {
        Guardian::assemble(
            &self.config,
            self.store.clone(),
            self.cipher.clone(),
            self.clock.clone(),
            collaborators,
        )
    }
}

//! Breach response: gather location and evidence, compose the alert, dispatch it
//! through rate limiter, router and offline queue, and log the intruder record.
//!
//! Collaborator failures degrade to placeholders; they never stop the alert.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::alert::{AlertDraft, BreachReason};
use crate::channel::AlertRouter;
use crate::clock::Clock;
use crate::collaborators::{Connectivity, EvidenceCamera, EvidenceUploader, LocationResolver, UploadRetryQueue};
use crate::error::TransmitError;
use crate::intruder::IntruderRecord;
use crate::queue::OfflineQueue;
use crate::rate_limiter::RateLimiter;
use crate::session::PresentationId;
use crate::store::SettingsStore;

/// How evidence for a response is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// Alert goes out without a photo.
    None,
    /// Capture a frame now with the configured camera.
    CaptureNow,
    /// A frame already captured (e.g. during owner verification).
    Captured(PathBuf),
}

/// One breach to respond to.
#[derive(Debug, Clone)]
pub struct BreachRequest {
    pub reason: BreachReason,
    /// Human-readable target (app label, "Quick Settings", ...).
    pub target: String,
    pub evidence: Evidence,
    /// Lock presentation this response belongs to; at most one response per presentation.
    pub presentation: Option<PresentationId>,
}

impl BreachRequest {
    pub fn new(reason: BreachReason, target: impl Into<String>) -> Self {
        Self {
            reason,
            target: target.into(),
            evidence: Evidence::None,
            presentation: None,
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn for_presentation(mut self, presentation: PresentationId) -> Self {
        self.presentation = Some(presentation);
        self
    }
}

/// How a breach response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// Handed to the transport and counted against the window.
    Delivered,
    /// No channel (or transport failure); parked in the offline queue.
    Queued,
    /// Alert window exhausted; dropped.
    RateLimited,
    /// No emergency number configured; dropped.
    NoRecipient,
    /// Presentation already produced a response.
    Suppressed,
    /// Could neither send nor park the alert.
    Lost,
}

/// Runs breach responses end to end. Shared by the watchdogs, owner verification
/// and the system-surface watcher.
pub struct BreachOrchestrator {
    router: Arc<AlertRouter>,
    limiter: Arc<RateLimiter>,
    queue: Arc<OfflineQueue>,
    store: Arc<SettingsStore>,
    clock: Arc<dyn Clock>,
    connectivity: Arc<dyn Connectivity>,
    camera: Option<Arc<dyn EvidenceCamera>>,
    uploader: Option<Arc<dyn EvidenceUploader>>,
    retry_queue: Option<Arc<dyn UploadRetryQueue>>,
    location: Option<Arc<dyn LocationResolver>>,
    location_timeout: Duration,
    capture_timeout: Duration,
    upload_timeout: Duration,
    /// Highest presentation that already produced a response.
    latch: Mutex<Option<PresentationId>>,
}

impl BreachOrchestrator {
    pub fn new(
        router: Arc<AlertRouter>,
        limiter: Arc<RateLimiter>,
        queue: Arc<OfflineQueue>,
        store: Arc<SettingsStore>,
        clock: Arc<dyn Clock>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            router,
            limiter,
            queue,
            store,
            clock,
            connectivity,
            camera: None,
            uploader: None,
            retry_queue: None,
            location: None,
            location_timeout: Duration::from_secs(8),
            capture_timeout: Duration::from_secs(5),
            upload_timeout: Duration::from_secs(15),
            latch: Mutex::new(None),
        }
    }

    pub fn with_camera(mut self, camera: Arc<dyn EvidenceCamera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn EvidenceUploader>, retry_queue: Arc<dyn UploadRetryQueue>) -> Self {
        self.uploader = Some(uploader);
        self.retry_queue = Some(retry_queue);
        self
    }

    pub fn with_location(mut self, location: Arc<dyn LocationResolver>, timeout: Duration) -> Self {
        self.location = Some(location);
        self.location_timeout = timeout;
        self
    }

    /// Bounds evidence capture and upload. Expiry degrades to the placeholders.
    pub fn with_evidence_timeouts(mut self, capture: Duration, upload: Duration) -> Self {
        self.capture_timeout = capture;
        self.upload_timeout = upload;
        self
    }

    /// Claims the latch for `presentation`. False when it already fired.
    fn claim(&self, presentation: PresentationId) -> bool {
        let mut latch = self.latch.lock().unwrap_or_else(|p| p.into_inner());
        match *latch {
            Some(fired) if presentation <= fired => false,
            _ => {
                *latch = Some(presentation);
                true
            }
        }
    }

    #[instrument(skip(self, request), fields(reason = %request.reason, target = %request.target))]
    pub async fn respond(&self, request: BreachRequest) -> DispatchOutcome {
        if let Some(presentation) = request.presentation {
            if !self.claim(presentation) {
                tracing::debug!(target: "hfs::orchestrator", %presentation, "response already sent for presentation");
                return DispatchOutcome::Suppressed;
            }
        }
        let occurred_at_ms = self.clock.now_ms();

        let location_link = self.resolve_location().await;
        let evidence_path = self.collect_evidence(&request.evidence).await;
        let evidence_link = match evidence_path.as_deref() {
            Some(path) => self.publish_evidence(path).await,
            None => None,
        };

        let draft = AlertDraft {
            reason: request.reason,
            target: request.target.clone(),
            occurred_at_ms,
            intruders: self.router.live_channels(),
            location_link: location_link.clone(),
            evidence_link: evidence_link.clone(),
        };
        let outcome = self.dispatch(&draft.compose()).await;

        let record = IntruderRecord::new(request.reason, request.target, occurred_at_ms)
            .with_location(location_link)
            .with_evidence(evidence_path.as_deref(), evidence_link)
            .with_outcome(outcome);
        if let Err(e) = self.store.append_intruder(&record) {
            tracing::warn!(target: "hfs::orchestrator", error = %e, "intruder record not saved");
        }

        tracing::info!(target: "hfs::orchestrator", outcome = ?outcome, "breach response finished");
        outcome
    }

    async fn resolve_location(&self) -> Option<String> {
        let resolver = self.location.as_ref()?;
        match tokio::time::timeout(self.location_timeout, resolver.resolve()).await {
            Ok(Ok(link)) => Some(link),
            Ok(Err(e)) => {
                tracing::warn!(target: "hfs::orchestrator", error = %e, "location unavailable");
                None
            }
            Err(_) => {
                tracing::warn!(target: "hfs::orchestrator", "location timed out");
                None
            }
        }
    }

    async fn collect_evidence(&self, evidence: &Evidence) -> Option<PathBuf> {
        match evidence {
            Evidence::None => None,
            Evidence::Captured(path) => Some(path.clone()),
            Evidence::CaptureNow => {
                let camera = self.camera.as_ref()?;
                match tokio::time::timeout(self.capture_timeout, camera.capture()).await {
                    Ok(Ok(path)) => Some(path),
                    Ok(Err(e)) => {
                        tracing::warn!(target: "hfs::orchestrator", error = %e, "evidence capture failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(target: "hfs::orchestrator", "evidence capture timed out");
                        None
                    }
                }
            }
        }
    }

    /// Uploads now when possible; otherwise hands the file to background retry.
    async fn publish_evidence(&self, path: &Path) -> Option<String> {
        if let Some(uploader) = self.uploader.as_ref() {
            if self.connectivity.is_online() {
                match tokio::time::timeout(self.upload_timeout, uploader.upload(path)).await {
                    Ok(Ok(link)) => return Some(link),
                    Ok(Err(e)) => tracing::warn!(target: "hfs::orchestrator", error = %e, "evidence upload failed"),
                    Err(_) => tracing::warn!(target: "hfs::orchestrator", "evidence upload timed out"),
                }
            }
        }
        if let Some(retry) = self.retry_queue.as_ref() {
            if let Err(e) = retry.enqueue(path) {
                tracing::warn!(target: "hfs::orchestrator", error = %e, "evidence retry not scheduled");
            }
        }
        None
    }

    async fn dispatch(&self, body: &str) -> DispatchOutcome {
        if !self.router.has_recipient() {
            tracing::error!(target: "hfs::orchestrator", "alert dropped: no emergency number configured");
            return DispatchOutcome::NoRecipient;
        }

        let Some(permit) = self.limiter.acquire().await else {
            tracing::warn!(target: "hfs::orchestrator", "alert dropped: window exhausted");
            return DispatchOutcome::RateLimited;
        };

        let Some(channel) = self.router.select_channel() else {
            return self.park(body);
        };

        match self.router.transmit(&channel, body).await {
            Ok(()) => {
                permit.commit();
                DispatchOutcome::Delivered
            }
            Err(TransmitError::NoRecipient) => {
                tracing::error!(target: "hfs::orchestrator", "alert dropped: no emergency number configured");
                DispatchOutcome::NoRecipient
            }
            Err(e) => {
                tracing::warn!(target: "hfs::orchestrator", error = %e, "transmit failed; parking alert");
                self.park(body)
            }
        }
    }

    fn park(&self, body: &str) -> DispatchOutcome {
        match self.queue.enqueue(body) {
            Ok(()) => DispatchOutcome::Queued,
            Err(e) => {
                tracing::error!(target: "hfs::orchestrator", error = %e, "alert could not be parked");
                DispatchOutcome::Lost
            }
        }
    }
}

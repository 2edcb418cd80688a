//! Owner verification for one lock presentation.
//!
//! `Capturing -> Verifying -> Deciding`. A match grants grace; a mismatch, a
//! verifier error, a capture failure or the timeout all count as a failed
//! verification and start a breach response latched to the presentation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::alert::BreachReason;
use crate::collaborators::{EvidenceCamera, IdentityVerdict, IdentityVerifier};
use crate::orchestrator::{BreachOrchestrator, BreachRequest, DispatchOutcome, Evidence};
use crate::session::{LockSession, PresentationId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Owner recognized; grace started for the context.
    Granted,
    /// Verification failed; carries the breach response outcome.
    Failed(DispatchOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    CaptureFailed,
    Mismatch,
    VerifierError,
    TimedOut,
}

enum Phase {
    Capturing,
    Verifying(PathBuf),
    Deciding {
        sample: Option<PathBuf>,
        verdict: Result<(), FailureCause>,
    },
}

/// Runs one verification attempt per lock presentation.
pub struct OwnerVerification {
    session: Arc<LockSession>,
    camera: Arc<dyn EvidenceCamera>,
    verifier: Arc<dyn IdentityVerifier>,
    orchestrator: Arc<BreachOrchestrator>,
    timeout: Duration,
    capture_timeout: Duration,
}

impl OwnerVerification {
    pub fn new(
        session: Arc<LockSession>,
        camera: Arc<dyn EvidenceCamera>,
        verifier: Arc<dyn IdentityVerifier>,
        orchestrator: Arc<BreachOrchestrator>,
        timeout: Duration,
    ) -> Self {
        Self {
            session,
            camera,
            verifier,
            orchestrator,
            timeout,
            capture_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    pub async fn attempt(&self, context: &str, presentation: PresentationId) -> VerificationResult {
        let mut phase = Phase::Capturing;
        loop {
            phase = match phase {
                Phase::Capturing => match tokio::time::timeout(self.capture_timeout, self.camera.capture()).await {
                    Ok(Ok(sample)) => Phase::Verifying(sample),
                    Ok(Err(e)) => {
                        tracing::warn!(target: "hfs::verify", %presentation, error = %e, "capture failed");
                        Phase::Deciding {
                            sample: None,
                            verdict: Err(FailureCause::CaptureFailed),
                        }
                    }
                    Err(_) => {
                        tracing::warn!(target: "hfs::verify", %presentation, "capture timed out");
                        Phase::Deciding {
                            sample: None,
                            verdict: Err(FailureCause::CaptureFailed),
                        }
                    }
                },
                Phase::Verifying(sample) => {
                    let verdict = match tokio::time::timeout(self.timeout, self.verifier.verify(&sample)).await {
                        Ok(Ok(IdentityVerdict::Match)) => Ok(()),
                        Ok(Ok(IdentityVerdict::Mismatch)) => Err(FailureCause::Mismatch),
                        Ok(Err(e)) => {
                            tracing::warn!(target: "hfs::verify", %presentation, error = %e, "verifier error");
                            Err(FailureCause::VerifierError)
                        }
                        Err(_) => Err(FailureCause::TimedOut),
                    };
                    Phase::Deciding {
                        sample: Some(sample),
                        verdict,
                    }
                }
                Phase::Deciding { sample, verdict } => {
                    return self.decide(context, presentation, sample, verdict).await;
                }
            };
        }
    }

    async fn decide(
        &self,
        context: &str,
        presentation: PresentationId,
        sample: Option<PathBuf>,
        verdict: Result<(), FailureCause>,
    ) -> VerificationResult {
        match verdict {
            Ok(()) => {
                self.session.grant_grace(context);
                VerificationResult::Granted
            }
            Err(cause) => {
                tracing::warn!(target: "hfs::verify", %presentation, context = %context, cause = ?cause, "owner verification failed");
                let evidence = sample.map_or(Evidence::None, Evidence::Captured);
                let request = BreachRequest::new(BreachReason::ForeignApp, context)
                    .with_evidence(evidence)
                    .for_presentation(presentation);
                VerificationResult::Failed(self.orchestrator.respond(request).await)
            }
        }
    }
}

//! Seams to platform capabilities the guard drives but does not implement:
//! camera, biometric match, cloud upload, location, connectivity, the lock UI and
//! the radio settings provider.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::alert::BreachReason;
use crate::error::CollaboratorError;
use crate::session::PresentationId;

#[async_trait]
pub trait EvidenceCamera: Send + Sync {
    /// Silently captures one frame and returns the file it was written to.
    async fn capture(&self) -> Result<PathBuf, CollaboratorError>;
}

#[async_trait]
pub trait EvidenceUploader: Send + Sync {
    /// Uploads `file` and returns a shareable link.
    async fn upload(&self, file: &Path) -> Result<String, CollaboratorError>;
}

/// Durable background upload retry (survives restarts on the platform side).
pub trait UploadRetryQueue: Send + Sync {
    fn enqueue(&self, file: &Path) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait LocationResolver: Send + Sync {
    /// Returns a map link for the current position.
    async fn resolve(&self) -> Result<String, CollaboratorError>;
}

/// Whether the device currently has data connectivity.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityVerdict {
    Match,
    Mismatch,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, sample: &Path) -> Result<IdentityVerdict, CollaboratorError>;
}

/// The visible lock surfaces.
pub trait Presenter: Send + Sync {
    /// Shows the owner authentication surface over `target`.
    fn present_authentication_surface(&self, target: &str, presentation: PresentationId);
    /// Shows the loud (siren) lockdown surface.
    fn present_lockdown_surface(&self, reason: BreachReason);
}

/// Authoritative read of the radio settings.
pub trait RadioSettings: Send + Sync {
    fn radio_disabled(&self) -> Result<bool, CollaboratorError>;
}

/// Connectivity that always reports online.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

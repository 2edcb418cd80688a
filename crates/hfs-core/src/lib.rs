//! HFS guard core: detects unauthorized access to protected contexts and to the
//! device lock, watches for hardware tampering, and delivers breach alerts.
//!
//! Data flow: [`ForegroundMonitor`] -> [`LockSession`] -> (breach)
//! [`BreachOrchestrator`] -> [`RateLimiter`] -> [`AlertRouter`] -> delivered, or
//! parked in the [`OfflineQueue`] until a watchdog sees a channel again.
//! [`Guardian`] owns and wires all of it.

pub mod alert;
pub mod channel;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod intruder;
pub mod monitor;
pub mod orchestrator;
pub mod queue;
pub mod rate_limiter;
pub mod session;
pub mod store;
pub mod vault;
pub mod verification;
pub mod watchdog;

pub use alert::{normalize_recipient, split_segments, AlertDraft, BreachReason};
pub use channel::{AlertRouter, AlertTransmitter, ChannelIdentity, ChannelProvider};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    AlwaysOnline, Connectivity, EvidenceCamera, EvidenceUploader, IdentityVerdict, IdentityVerifier,
    LocationResolver, Presenter, RadioSettings, UploadRetryQueue,
};
pub use config::EngineConfig;
pub use crypto::{AesGcmCipher, SecretCipher, VaultError};
pub use engine::{Collaborators, GuardEvent, GuardHandle, Guardian};
pub use error::{ChannelError, CollaboratorError, GuardError, StoreError, TransmitError};
pub use intruder::IntruderRecord;
pub use monitor::{ForegroundMonitor, MonitorSignal, RawWindowEvent, WindowEventKind};
pub use orchestrator::{BreachOrchestrator, BreachRequest, DispatchOutcome, Evidence};
pub use queue::{FlushOutcome, OfflineQueue, PendingAlert};
pub use rate_limiter::{RateLimiter, RateWindow, SendPermit};
pub use session::{LockSession, LockState, PresentationId, SessionSnapshot, Transition};
pub use store::SettingsStore;
pub use vault::{BreachCause, TamperVault, VaultVerdict};
pub use verification::{OwnerVerification, VerificationResult};
pub use watchdog::{HardwareIdentityWatchdog, IdentityReport, RadioKillWatchdog, WatchdogOutcome};

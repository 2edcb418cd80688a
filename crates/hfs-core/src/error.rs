//! Error types shared across the guard.
//!
//! Pipeline boundaries (orchestrator, watchdogs, queue flush) convert these into
//! outcomes and a log line; nothing here is fatal to the running guard.

use thiserror::Error;

use crate::crypto::VaultError;

/// Failures of the persistent settings store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings store: {0}")]
    Sled(#[from] sled::Error),
    #[error("settings store: malformed record: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("settings store: {0}")]
    Vault(#[from] VaultError),
}

/// Enumeration of hardware alert channels failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The platform refused to list channels (missing runtime permission).
    #[error("channel enumeration denied")]
    PermissionDenied,
    #[error("channel enumeration unavailable: {0}")]
    Unavailable(String),
}

/// The alert transport rejected a send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransmitError {
    /// No emergency number is configured, or it could not be decrypted.
    #[error("no alert recipient configured")]
    NoRecipient,
    #[error("alert transport rejected send: {0}")]
    Rejected(String),
}

/// Generic failure of an async collaborator (camera, uploader, location, verifier).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{collaborator}: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Top-level error for assembling and driving the guard.
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("guardian: event loop stopped")]
    LoopClosed,
}

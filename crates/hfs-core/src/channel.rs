//! Hardware alert channels (one per SIM slot) and routing alerts over them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::alert::{normalize_recipient, split_segments};
use crate::crypto::SecretCipher;
use crate::error::{ChannelError, TransmitError};
use crate::store::SettingsStore;

/// A live hardware channel as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelIdentity {
    /// Zero-based slot index.
    pub slot: u8,
    /// Stable subscription identity; this is what the tamper vault remembers.
    pub subscription_id: String,
    /// Line number, when the platform exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<String>,
}

impl ChannelIdentity {
    pub fn new(slot: u8, subscription_id: impl Into<String>) -> Self {
        Self {
            slot,
            subscription_id: subscription_id.into(),
            line_number: None,
        }
    }

    pub fn with_line_number(mut self, number: impl Into<String>) -> Self {
        self.line_number = Some(number.into());
        self
    }
}

/// Enumerates live channels.
pub trait ChannelProvider: Send + Sync {
    fn active_channels(&self) -> Result<Vec<ChannelIdentity>, ChannelError>;
}

/// Hands segments to the platform transport over a specific channel.
#[async_trait]
pub trait AlertTransmitter: Send + Sync {
    async fn send(&self, channel: &ChannelIdentity, recipient: &str, segments: &[String]) -> Result<(), TransmitError>;
}

/// Chooses a working channel and transmits through it.
pub struct AlertRouter {
    provider: Arc<dyn ChannelProvider>,
    transmitter: Arc<dyn AlertTransmitter>,
    store: Arc<SettingsStore>,
    cipher: Arc<dyn SecretCipher>,
    country_code: String,
    segment_limit: usize,
    send_timeout: Duration,
}

impl AlertRouter {
    pub fn new(
        provider: Arc<dyn ChannelProvider>,
        transmitter: Arc<dyn AlertTransmitter>,
        store: Arc<SettingsStore>,
        cipher: Arc<dyn SecretCipher>,
        country_code: impl Into<String>,
        segment_limit: usize,
    ) -> Self {
        Self {
            provider,
            transmitter,
            store,
            cipher,
            country_code: country_code.into(),
            segment_limit,
            send_timeout: Duration::from_secs(30),
        }
    }

    /// Bounds how long the transport may take to accept one send.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Live channels, empty when enumeration is denied or unavailable.
    pub fn live_channels(&self) -> Vec<ChannelIdentity> {
        match self.provider.active_channels() {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!(target: "hfs::router", error = %e, "cannot enumerate alert channels");
                Vec::new()
            }
        }
    }

    /// First live channel, or `None` when nothing can carry an alert.
    pub fn select_channel(&self) -> Option<ChannelIdentity> {
        self.live_channels().into_iter().next()
    }

    /// Whether an emergency number is configured and readable.
    pub fn has_recipient(&self) -> bool {
        self.recipient().is_ok()
    }

    /// Decrypted and normalized emergency number.
    fn recipient(&self) -> Result<String, TransmitError> {
        let sealed = match self.store.emergency_number_sealed() {
            Ok(Some(s)) => s,
            Ok(None) => return Err(TransmitError::NoRecipient),
            Err(e) => {
                tracing::error!(target: "hfs::router", error = %e, "emergency number unreadable");
                return Err(TransmitError::NoRecipient);
            }
        };
        let raw = self.cipher.decrypt(&sealed).map_err(|e| {
            tracing::error!(target: "hfs::router", error = %e, "emergency number cannot be decrypted");
            TransmitError::NoRecipient
        })?;
        if raw.trim().is_empty() {
            return Err(TransmitError::NoRecipient);
        }
        Ok(normalize_recipient(&raw, &self.country_code))
    }

    /// Sends `body` once over `channel`.
    pub async fn transmit(&self, channel: &ChannelIdentity, body: &str) -> Result<(), TransmitError> {
        let recipient = self.recipient()?;
        let segments = split_segments(body, self.segment_limit);
        match tokio::time::timeout(self.send_timeout, self.transmitter.send(channel, &recipient, &segments)).await {
            Ok(sent) => sent?,
            Err(_) => {
                tracing::warn!(target: "hfs::router", slot = channel.slot, "transport did not answer in time");
                return Err(TransmitError::Rejected("send timed out".to_string()));
            }
        }
        tracing::info!(
            target: "hfs::router",
            slot = channel.slot,
            segments = segments.len(),
            "alert handed to transport"
        );
        Ok(())
    }
}

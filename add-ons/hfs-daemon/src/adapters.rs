//! Console-backed platform adapters. Hardware state is driven by admin
//! commands on stdin; transmissions and surfaces are logged.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use hfs_core::{
    AlertTransmitter, BreachReason, ChannelError, ChannelIdentity, ChannelProvider, CollaboratorError, PresentationId,
    Presenter, RadioSettings, TransmitError,
};

#[derive(Default)]
pub struct SharedChannels {
    live: RwLock<Vec<ChannelIdentity>>,
    denied: AtomicBool,
}

impl SharedChannels {
    pub fn set(&self, channels: Vec<ChannelIdentity>) {
        match self.live.write() {
            Ok(mut live) => *live = channels,
            Err(poisoned) => *poisoned.into_inner() = channels,
        }
    }

    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }
}

impl ChannelProvider for SharedChannels {
    fn active_channels(&self) -> Result<Vec<ChannelIdentity>, ChannelError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(ChannelError::PermissionDenied);
        }
        self.live
            .read()
            .map(|live| live.clone())
            .map_err(|e| ChannelError::Unavailable(e.to_string()))
    }
}

#[derive(Default)]
pub struct SharedRadio(AtomicBool);

impl SharedRadio {
    pub fn set_disabled(&self, disabled: bool) {
        self.0.store(disabled, Ordering::SeqCst);
    }
}

impl RadioSettings for SharedRadio {
    fn radio_disabled(&self) -> Result<bool, CollaboratorError> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

/// Keeps only the last two digits of a number for logs.
fn mask(number: &str) -> String {
    let tail: String = number.chars().rev().take(2).collect::<Vec<_>>().into_iter().rev().collect();
    format!("***{}", tail)
}

pub struct ConsoleTransmitter;

#[async_trait]
impl AlertTransmitter for ConsoleTransmitter {
    async fn send(&self, channel: &ChannelIdentity, recipient: &str, segments: &[String]) -> Result<(), TransmitError> {
        tracing::info!(
            target: "hfs::daemon",
            slot = channel.slot,
            recipient = %mask(recipient),
            segments = segments.len(),
            body = %segments.concat(),
            "ALERT"
        );
        Ok(())
    }
}

pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn present_authentication_surface(&self, target: &str, presentation: PresentationId) {
        tracing::info!(target: "hfs::daemon", %presentation, target_context = %target, "present authentication surface");
    }

    fn present_lockdown_surface(&self, reason: BreachReason) {
        tracing::warn!(target: "hfs::daemon", reason = %reason, "present LOCKDOWN surface");
    }
}

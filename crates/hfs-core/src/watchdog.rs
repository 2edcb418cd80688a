//! Hardware tamper watchdogs: radio-kill and channel identity changes.
//!
//! Both are silent no-ops while the master arm switch is off.

use std::sync::Arc;

use crate::alert::BreachReason;
use crate::channel::ChannelProvider;
use crate::collaborators::{Presenter, RadioSettings};
use crate::error::ChannelError;
use crate::orchestrator::{BreachOrchestrator, BreachRequest, DispatchOutcome, Evidence};
use crate::queue::{FlushOutcome, OfflineQueue};
use crate::store::SettingsStore;
use crate::vault::{TamperVault, VaultVerdict};

pub const RADIO_KILL_TARGET: &str = "Quick Settings";
pub const CHANNEL_SWAP_TARGET: &str = "SIM CARD REMOVED / SWAPPED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchdogOutcome {
    Disarmed,
    /// Signal not confirmed by the authoritative read.
    Discounted,
    /// Channel enumeration denied; nothing could be checked.
    NoCapability,
    Verified(VaultVerdict),
    Breach(DispatchOutcome),
}

fn armed(store: &SettingsStore) -> bool {
    match store.tamper_watchdog_armed() {
        Ok(armed) => armed,
        Err(e) => {
            tracing::warn!(target: "hfs::watchdog", error = %e, "arm switch unreadable; treating as disarmed");
            false
        }
    }
}

/// Reacts to the radio being switched off while armed.
pub struct RadioKillWatchdog {
    store: Arc<SettingsStore>,
    radio: Arc<dyn RadioSettings>,
    presenter: Arc<dyn Presenter>,
    orchestrator: Arc<BreachOrchestrator>,
}

impl RadioKillWatchdog {
    pub fn new(
        store: Arc<SettingsStore>,
        radio: Arc<dyn RadioSettings>,
        presenter: Arc<dyn Presenter>,
        orchestrator: Arc<BreachOrchestrator>,
    ) -> Self {
        Self {
            store,
            radio,
            presenter,
            orchestrator,
        }
    }

    /// Handles a "radio disabled" broadcast.
    pub async fn on_radio_signal(&self) -> WatchdogOutcome {
        if !armed(&self.store) {
            return WatchdogOutcome::Disarmed;
        }
        match self.radio.radio_disabled() {
            Ok(true) => {}
            Ok(false) => return WatchdogOutcome::Discounted,
            Err(e) => {
                tracing::warn!(target: "hfs::watchdog", error = %e, "radio state unreadable; signal discounted");
                return WatchdogOutcome::Discounted;
            }
        }

        tracing::warn!(target: "hfs::watchdog", "radio kill confirmed; lockdown");
        self.presenter.present_lockdown_surface(BreachReason::RadioKill);
        let request = BreachRequest::new(BreachReason::RadioKill, RADIO_KILL_TARGET).with_evidence(Evidence::CaptureNow);
        WatchdogOutcome::Breach(self.orchestrator.respond(request).await)
    }
}

/// What an identity-set change did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityReport {
    pub flush: FlushOutcome,
    pub outcome: WatchdogOutcome,
}

/// Reacts to channel identity changes: flushes the parked alert, then checks the vault.
pub struct HardwareIdentityWatchdog {
    store: Arc<SettingsStore>,
    provider: Arc<dyn ChannelProvider>,
    vault: Arc<TamperVault>,
    queue: Arc<OfflineQueue>,
    presenter: Arc<dyn Presenter>,
    orchestrator: Arc<BreachOrchestrator>,
}

impl HardwareIdentityWatchdog {
    pub fn new(
        store: Arc<SettingsStore>,
        provider: Arc<dyn ChannelProvider>,
        vault: Arc<TamperVault>,
        queue: Arc<OfflineQueue>,
        presenter: Arc<dyn Presenter>,
        orchestrator: Arc<BreachOrchestrator>,
    ) -> Self {
        Self {
            store,
            provider,
            vault,
            queue,
            presenter,
            orchestrator,
        }
    }

    /// Handles an "identity set changed" broadcast: fire the parked alert first,
    /// then compare the live channels against the vault.
    pub async fn on_identity_set_changed(&self) -> IdentityReport {
        if !armed(&self.store) {
            return IdentityReport {
                flush: FlushOutcome::NoPending,
                outcome: WatchdogOutcome::Disarmed,
            };
        }

        let flush = self.queue.flush_if_possible().await;
        if flush != FlushOutcome::NoPending {
            tracing::info!(target: "hfs::watchdog", flush = ?flush, "parked alert flush attempted");
        }

        let live = match self.provider.active_channels() {
            Ok(live) => live,
            Err(ChannelError::PermissionDenied) => {
                tracing::warn!(target: "hfs::watchdog", "channel enumeration denied; identity check skipped");
                return IdentityReport {
                    flush,
                    outcome: WatchdogOutcome::NoCapability,
                };
            }
            Err(e) => {
                tracing::warn!(target: "hfs::watchdog", error = %e, "channel enumeration failed; identity check skipped");
                return IdentityReport {
                    flush,
                    outcome: WatchdogOutcome::NoCapability,
                };
            }
        };

        let verdict = match self.vault.classify(&live) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(target: "hfs::watchdog", error = %e, "vault unreadable; identity check skipped");
                return IdentityReport {
                    flush,
                    outcome: WatchdogOutcome::NoCapability,
                };
            }
        };

        if !verdict.is_breach() {
            tracing::debug!(target: "hfs::watchdog", verdict = ?verdict, "hardware matches trusted vault");
            return IdentityReport {
                flush,
                outcome: WatchdogOutcome::Verified(verdict),
            };
        }

        tracing::warn!(target: "hfs::watchdog", verdict = ?verdict, "channel breach confirmed; lockdown");
        self.presenter.present_lockdown_surface(BreachReason::ChannelSwap);
        let request =
            BreachRequest::new(BreachReason::ChannelSwap, CHANNEL_SWAP_TARGET).with_evidence(Evidence::CaptureNow);
        IdentityReport {
            flush,
            outcome: WatchdogOutcome::Breach(self.orchestrator.respond(request).await),
        }
    }
}

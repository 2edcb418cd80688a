//! Tamper vault: the sealed identities of the trusted hardware channels and the
//! classification of a live channel set against them.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::channel::{ChannelIdentity, ChannelProvider};
use crate::crypto::SecretCipher;
use crate::error::{GuardError, StoreError};
use crate::store::{SettingsStore, VAULT_SLOTS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreachCause {
    /// A live channel is not in the vault.
    ForeignChannel { slot: u8 },
    /// The vault is populated but no live channel matches it.
    TrustedChannelMissing,
    /// A stored slot cannot be opened.
    CorruptSlot { slot: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultVerdict {
    /// Nothing has been marked trusted yet.
    Unconfigured,
    Safe,
    Breach(BreachCause),
}

impl VaultVerdict {
    pub fn is_breach(&self) -> bool {
        matches!(self, Self::Breach(_))
    }
}

/// Remembers the trusted channel identities and classifies the live set against them.
pub struct TamperVault {
    store: Arc<SettingsStore>,
    cipher: Arc<dyn SecretCipher>,
    write_gate: Mutex<()>,
}

impl TamperVault {
    pub fn new(store: Arc<SettingsStore>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            store,
            cipher,
            write_gate: Mutex::new(()),
        }
    }

    /// Marks the currently inserted channels as trusted, replacing both slots.
    /// Returns how many slots were written. Enumeration denial leaves the vault as is.
    pub fn scan_current_as_trusted(&self, provider: &dyn ChannelProvider) -> Result<usize, GuardError> {
        let live = provider.active_channels()?;
        let sealed = live
            .iter()
            .filter(|c| c.slot < VAULT_SLOTS)
            .map(|c| Ok((c.slot, self.cipher.encrypt(&c.subscription_id)?)))
            .collect::<Result<Vec<_>, crate::crypto::VaultError>>()
            .map_err(StoreError::from)?;

        let _gate = self.write_gate.lock().unwrap_or_else(|p| p.into_inner());
        self.store.clear_vault_slots()?;
        for (slot, value) in &sealed {
            self.store.set_vault_slot(*slot, value)?;
        }
        tracing::info!(target: "hfs::vault", slots = sealed.len(), "trusted channels recorded");
        Ok(sealed.len())
    }

    /// Classifies `live` against the stored slots.
    pub fn classify(&self, live: &[ChannelIdentity]) -> Result<VaultVerdict, StoreError> {
        let mut trusted = BTreeSet::new();
        for slot in 0..VAULT_SLOTS {
            let Some(sealed) = self.store.vault_slot(slot)? else {
                continue;
            };
            match self.cipher.decrypt(&sealed) {
                Ok(identity) => {
                    trusted.insert(identity);
                }
                Err(e) => {
                    tracing::warn!(target: "hfs::vault", slot, error = %e, "vault slot unreadable; failing closed");
                    return Ok(VaultVerdict::Breach(BreachCause::CorruptSlot { slot }));
                }
            }
        }

        if trusted.is_empty() {
            return Ok(VaultVerdict::Unconfigured);
        }
        if let Some(foreign) = live.iter().find(|c| !trusted.contains(&c.subscription_id)) {
            return Ok(VaultVerdict::Breach(BreachCause::ForeignChannel { slot: foreign.slot }));
        }
        if !live.iter().any(|c| trusted.contains(&c.subscription_id)) {
            return Ok(VaultVerdict::Breach(BreachCause::TrustedChannelMissing));
        }
        Ok(VaultVerdict::Safe)
    }
}

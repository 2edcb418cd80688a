//! Persistent settings store backed by sled.
//!
//! One tree per concern:
//!
//! | tree           | contents                                                     |
//! |----------------|--------------------------------------------------------------|
//! | `settings`     | arm switch, phone protection, protected contexts, sealed number |
//! | `vault`        | sealed trusted channel identity per slot (`"0"`, `"1"`)     |
//! | `pending`      | the single undelivered alert                                  |
//! | `limiter`      | rate window start and count                                   |
//! | `intruder_log` | one record per breach response, keyed chronologically       |
//!
//! Values are JSON. Writes that must survive a power cut mid-breach (pending
//! alert, vault) are flushed before returning.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;
use crate::intruder::IntruderRecord;
use crate::queue::PendingAlert;
use crate::rate_limiter::RateWindow;

const TREE_SETTINGS: &str = "settings";
const TREE_VAULT: &str = "vault";
const TREE_PENDING: &str = "pending";
const TREE_LIMITER: &str = "limiter";
const TREE_INTRUDERS: &str = "intruder_log";

const KEY_ARMED: &str = "tamper_watchdog_armed";
const KEY_PHONE_PROTECTION: &str = "phone_protection";
const KEY_PROTECTED: &str = "protected_contexts";
const KEY_EMERGENCY_NUMBER: &str = "emergency_number";
const KEY_PENDING: &str = "alert";
const KEY_WINDOW: &str = "window";

/// Number of hardware channel slots tracked by the tamper vault.
pub const VAULT_SLOTS: u8 = 2;

/// Sled-backed persistence, one tree per concern.
pub struct SettingsStore {
    db: sled::Db,
    settings: sled::Tree,
    vault: sled::Tree,
    pending: sled::Tree,
    limiter: sled::Tree,
    intruders: sled::Tree,
}

impl SettingsStore {
    /// Opens (or creates) the store at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            settings: db.open_tree(TREE_SETTINGS)?,
            vault: db.open_tree(TREE_VAULT)?,
            pending: db.open_tree(TREE_PENDING)?,
            limiter: db.open_tree(TREE_LIMITER)?,
            intruders: db.open_tree(TREE_INTRUDERS)?,
            db,
        })
    }

    fn get_json<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> Result<Option<T>, StoreError> {
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(tree: &sled::Tree, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    // --- settings -------------------------------------------------------

    /// Master arm switch for the hardware tamper watchdogs. Off until set.
    pub fn tamper_watchdog_armed(&self) -> Result<bool, StoreError> {
        Ok(Self::get_json(&self.settings, KEY_ARMED)?.unwrap_or(false))
    }

    pub fn set_tamper_watchdog_armed(&self, armed: bool) -> Result<(), StoreError> {
        Self::put_json(&self.settings, KEY_ARMED, &armed)
    }

    /// Whether a screen wake pre-emptively locks the device. On until cleared.
    pub fn phone_protection_enabled(&self) -> Result<bool, StoreError> {
        Ok(Self::get_json(&self.settings, KEY_PHONE_PROTECTION)?.unwrap_or(true))
    }

    pub fn set_phone_protection_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        Self::put_json(&self.settings, KEY_PHONE_PROTECTION, &enabled)
    }

    /// Contexts that require owner verification.
    pub fn protected_contexts(&self) -> Result<BTreeSet<String>, StoreError> {
        Ok(Self::get_json(&self.settings, KEY_PROTECTED)?.unwrap_or_default())
    }

    pub fn set_protected_contexts<I, S>(&self, contexts: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = contexts.into_iter().map(Into::into).collect();
        Self::put_json(&self.settings, KEY_PROTECTED, &set)
    }

    /// Emergency number as stored: sealed by a [`crate::SecretCipher`].
    pub fn emergency_number_sealed(&self) -> Result<Option<String>, StoreError> {
        Self::get_json(&self.settings, KEY_EMERGENCY_NUMBER)
    }

    pub fn set_emergency_number_sealed(&self, sealed: &str) -> Result<(), StoreError> {
        Self::put_json(&self.settings, KEY_EMERGENCY_NUMBER, &sealed)?;
        self.settings.flush()?;
        Ok(())
    }

    // --- vault ----------------------------------------------------------

    /// Sealed subscription id remembered for `slot`.
    pub fn vault_slot(&self, slot: u8) -> Result<Option<String>, StoreError> {
        Self::get_json(&self.vault, &slot.to_string())
    }

    pub fn set_vault_slot(&self, slot: u8, sealed: &str) -> Result<(), StoreError> {
        Self::put_json(&self.vault, &slot.to_string(), &sealed)?;
        self.vault.flush()?;
        Ok(())
    }

    pub fn clear_vault_slots(&self) -> Result<(), StoreError> {
        for slot in 0..VAULT_SLOTS {
            self.vault.remove(slot.to_string().as_bytes())?;
        }
        self.vault.flush()?;
        Ok(())
    }

    // --- pending alert --------------------------------------------------

    pub fn pending_alert(&self) -> Result<Option<PendingAlert>, StoreError> {
        Self::get_json(&self.pending, KEY_PENDING)
    }

    /// Stores the pending alert, replacing any existing one.
    pub fn set_pending_alert(&self, alert: &PendingAlert) -> Result<(), StoreError> {
        Self::put_json(&self.pending, KEY_PENDING, alert)?;
        self.pending.flush()?;
        Ok(())
    }

    pub fn clear_pending_alert(&self) -> Result<(), StoreError> {
        self.pending.remove(KEY_PENDING.as_bytes())?;
        self.pending.flush()?;
        Ok(())
    }

    // --- rate window ----------------------------------------------------

    pub fn rate_window(&self) -> Result<Option<RateWindow>, StoreError> {
        Self::get_json(&self.limiter, KEY_WINDOW)
    }

    pub fn set_rate_window(&self, window: &RateWindow) -> Result<(), StoreError> {
        Self::put_json(&self.limiter, KEY_WINDOW, window)
    }

    // --- intruder log ---------------------------------------------------

    /// Appends a record; keys sort by occurrence time.
    pub fn append_intruder(&self, record: &IntruderRecord) -> Result<(), StoreError> {
        let key = format!("{:020}-{}", record.occurred_at_ms.max(0), record.id);
        Self::put_json(&self.intruders, &key, record)
    }

    /// All records, newest first.
    pub fn intruder_records(&self) -> Result<Vec<IntruderRecord>, StoreError> {
        let mut out = Vec::new();
        for item in self.intruders.iter().rev() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Deletes the record with `id`. Returns whether one existed.
    pub fn delete_intruder(&self, id: &str) -> Result<bool, StoreError> {
        let suffix = format!("-{}", id);
        for item in self.intruders.iter() {
            let (key, _) = item?;
            if key.ends_with(suffix.as_bytes()) {
                self.intruders.remove(key)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Flushes every tree to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::BreachReason;
    use crate::orchestrator::DispatchOutcome;

    fn open() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::open_path(dir.path().join("hfs")).unwrap();
        (dir, store)
    }

    #[test]
    fn switches_have_expected_defaults() {
        let (_dir, store) = open();
        assert!(!store.tamper_watchdog_armed().unwrap());
        assert!(store.phone_protection_enabled().unwrap());
        assert!(store.protected_contexts().unwrap().is_empty());
        store.set_tamper_watchdog_armed(true).unwrap();
        assert!(store.tamper_watchdog_armed().unwrap());
    }

    #[test]
    fn protected_contexts_are_deduplicated() {
        let (_dir, store) = open();
        store
            .set_protected_contexts(["com.mail", "com.bank", "com.mail"])
            .unwrap();
        let set = store.protected_contexts().unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("com.bank"));
    }

    #[test]
    fn vault_slots_clear_together() {
        let (_dir, store) = open();
        store.set_vault_slot(0, "aa").unwrap();
        store.set_vault_slot(1, "bb").unwrap();
        assert_eq!(store.vault_slot(1).unwrap().as_deref(), Some("bb"));
        store.clear_vault_slots().unwrap();
        assert!(store.vault_slot(0).unwrap().is_none());
        assert!(store.vault_slot(1).unwrap().is_none());
    }

    #[test]
    fn pending_alert_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hfs");
        {
            let store = SettingsStore::open_path(&path).unwrap();
            store
                .set_pending_alert(&PendingAlert {
                    body: "queued".into(),
                    queued_at_ms: 42,
                })
                .unwrap();
        }
        let store = SettingsStore::open_path(&path).unwrap();
        let pending = store.pending_alert().unwrap().unwrap();
        assert_eq!(pending.body, "queued");
        store.clear_pending_alert().unwrap();
        assert!(store.pending_alert().unwrap().is_none());
    }

    #[test]
    fn intruder_log_is_newest_first_and_deletable() {
        let (_dir, store) = open();
        let older = IntruderRecord::new(BreachReason::RadioKill, "Quick Settings", 1_000);
        let newer = IntruderRecord::new(BreachReason::ForeignApp, "com.mail", 2_000)
            .with_outcome(DispatchOutcome::Delivered);
        store.append_intruder(&older).unwrap();
        store.append_intruder(&newer).unwrap();

        let records = store.intruder_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, newer.id);

        assert!(store.delete_intruder(&older.id.to_string()).unwrap());
        assert!(!store.delete_intruder(&older.id.to_string()).unwrap());
        assert_eq!(store.intruder_records().unwrap().len(), 1);
    }
}

//! Engine configuration: defaults, then an optional file, then `HFS__*` env vars.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the guard. Defaults mirror the deployed device behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the sled database.
    pub storage_path: String,
    /// How long an owner unlock stays valid for the same context.
    pub grace_ms: u64,
    /// Minimum gap between two system-surface alerts.
    pub system_cooldown_ms: u64,
    /// Failed-attempt streak that counts as a system-surface breach.
    pub system_failure_threshold: u32,
    /// Length of the outbound alert window.
    pub rate_window_ms: u64,
    /// Alerts allowed per window.
    pub rate_max_per_window: u32,
    /// Owner verification budget; expiry counts as a failed verification.
    pub verification_timeout_ms: u64,
    /// Location lookup budget; expiry embeds the GPS placeholder.
    pub location_timeout_ms: u64,
    /// Camera capture budget for evidence and verification samples.
    pub capture_timeout_ms: u64,
    /// Evidence upload budget; expiry hands the file to background retry.
    pub upload_timeout_ms: u64,
    /// How long the transport may take to accept one send.
    pub send_timeout_ms: u64,
    /// Prefix for bare 10-digit emergency numbers.
    pub default_country_code: String,
    /// Maximum characters per transmitted segment.
    pub segment_char_limit: usize,
    /// Context id of our own lock surface.
    pub own_surface_id: String,
    /// Context id of the operating system's authentication surface.
    pub system_auth_surface_id: String,
    /// Device home surface; ids containing "launcher" are treated as home regardless.
    #[serde(default)]
    pub launcher_id: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_path: "./data/hfs".to_string(),
            grace_ms: 10_000,
            system_cooldown_ms: 5_000,
            system_failure_threshold: 2,
            rate_window_ms: 300_000,
            rate_max_per_window: 3,
            verification_timeout_ms: 1_500,
            location_timeout_ms: 8_000,
            capture_timeout_ms: 5_000,
            upload_timeout_ms: 15_000,
            send_timeout_ms: 30_000,
            default_country_code: "+91".to_string(),
            segment_char_limit: 160,
            own_surface_id: "com.hfs.security".to_string(),
            system_auth_surface_id: "com.android.systemui".to_string(),
            launcher_id: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration. File path comes from `HFS_CONFIG` (default `config/hfs`,
    /// skipped when absent); env overrides use `HFS__GRACE_MS` style keys.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("HFS_CONFIG").unwrap_or_else(|_| "config/hfs".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Same layering as [`load`](Self::load) with an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("storage_path", d.storage_path)?
            .set_default("grace_ms", d.grace_ms as i64)?
            .set_default("system_cooldown_ms", d.system_cooldown_ms as i64)?
            .set_default("system_failure_threshold", d.system_failure_threshold as i64)?
            .set_default("rate_window_ms", d.rate_window_ms as i64)?
            .set_default("rate_max_per_window", d.rate_max_per_window as i64)?
            .set_default("verification_timeout_ms", d.verification_timeout_ms as i64)?
            .set_default("location_timeout_ms", d.location_timeout_ms as i64)?
            .set_default("capture_timeout_ms", d.capture_timeout_ms as i64)?
            .set_default("upload_timeout_ms", d.upload_timeout_ms as i64)?
            .set_default("send_timeout_ms", d.send_timeout_ms as i64)?
            .set_default("default_country_code", d.default_country_code)?
            .set_default("segment_char_limit", d.segment_char_limit as i64)?
            .set_default("own_surface_id", d.own_surface_id)?
            .set_default("system_auth_surface_id", d.system_auth_surface_id)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("HFS").separator("__"))
            .build()?;

        built.try_deserialize()
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_millis(self.verification_timeout_ms)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

//! Alert payload: breach reasons, body composition, recipient normalization and
//! segmenting for length-capped transports.

use std::fmt;

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::channel::ChannelIdentity;

pub const ALERT_HEADER: &str = "⚠ HFS SECURITY ALERT";
pub const LOCATION_PENDING: &str = "GPS signal pending";
pub const EVIDENCE_PENDING: &str = "Pending Upload";

/// Why a breach response was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreachReason {
    /// Repeated failures on the operating system's authentication surface.
    SystemSurface,
    /// Owner verification failed on a protected context.
    ForeignApp,
    /// Hardware channel set no longer matches the trusted vault.
    ChannelSwap,
    /// Radio-kill (airplane mode) confirmed while armed.
    RadioKill,
}

impl BreachReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::SystemSurface => "System Unlock Failure",
            Self::ForeignApp => "Face Mismatch",
            Self::ChannelSwap => "SIM CARD REMOVED / SWAPPED",
            Self::RadioKill => "AIRPLANE MODE ACTIVATED",
        }
    }
}

impl fmt::Display for BreachReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything needed to render one alert body.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub reason: BreachReason,
    pub target: String,
    pub occurred_at_ms: i64,
    /// Live channels at breach time; only those exposing a line number are listed.
    pub intruders: Vec<ChannelIdentity>,
    pub location_link: Option<String>,
    pub evidence_link: Option<String>,
}

impl AlertDraft {
    pub fn compose(&self) -> String {
        let mut lines = vec![
            ALERT_HEADER.to_string(),
            format!("Breach: {}", self.reason),
            format!("App: {}", self.target),
            format!("Time: {}", format_alert_time(self.occurred_at_ms)),
        ];
        for channel in &self.intruders {
            if let Some(number) = channel.line_number.as_deref().filter(|n| !n.is_empty()) {
                lines.push(format!("Intruder ID (Slot {}): {}", u16::from(channel.slot) + 1, number));
            }
        }
        lines.push(format!("Map: {}", self.location_link.as_deref().unwrap_or(LOCATION_PENDING)));
        lines.push(format!("Drive: {}", self.evidence_link.as_deref().unwrap_or(EVIDENCE_PENDING)));
        lines.join("\n")
    }
}

/// `dd-MMM HH:mm` in device local time.
pub fn format_alert_time(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(t) => t.format("%d-%b %H:%M").to_string(),
        None => "--".to_string(),
    }
}

/// Normalizes a stored emergency number into dialable form.
///
/// Leading `+` is kept verbatim. Otherwise every non-digit is stripped; exactly
/// ten digits get `country_code`, anything else is prefixed with `+`.
pub fn normalize_recipient(raw: &str, country_code: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('+') {
        return trimmed.to_string();
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 {
        return format!("{}{}", country_code, digits);
    }
    format!("+{}", digits)
}

/// Splits `body` into segments of at most `limit` characters (not bytes).
pub fn split_segments(body: &str, limit: usize) -> Vec<String> {
    if limit == 0 || body.chars().count() <= limit {
        return vec![body.to_string()];
    }
    let chars: Vec<char> = body.chars().collect();
    chars.chunks(limit).map(|c| c.iter().collect()).collect()
}

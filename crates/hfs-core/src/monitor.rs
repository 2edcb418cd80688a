//! Foreground event monitor: turns raw window events into session signals.

use serde::{Deserialize, Serialize};

const FAILURE_PHRASES: [&str; 4] = ["not recognized", "mismatch", "incorrect", "try again"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowEventKind {
    WindowStateChanged,
    ViewClicked,
    ViewFocused,
    ContentChanged,
}

/// A window event as delivered by the platform accessibility stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWindowEvent {
    pub package: String,
    pub kind: WindowEventKind,
    #[serde(default)]
    pub text: Vec<String>,
}

impl RawWindowEvent {
    pub fn new(package: impl Into<String>, kind: WindowEventKind) -> Self {
        Self {
            package: package.into(),
            kind,
            text: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text.push(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorSignal {
    ForegroundChanged(String),
    AuthSurfaceFailureText,
    AuthSurfaceClick,
}

/// Turns raw window events into session signals.
pub struct ForegroundMonitor {
    system_surface_id: String,
}

impl ForegroundMonitor {
    pub fn new(system_surface_id: impl Into<String>) -> Self {
        Self {
            system_surface_id: system_surface_id.into(),
        }
    }

    /// Signals for one event, foreground change first.
    pub fn normalize(&self, event: &RawWindowEvent) -> Vec<MonitorSignal> {
        let package = event.package.trim();
        if package.is_empty() {
            return Vec::new();
        }
        let mut signals = Vec::with_capacity(2);
        if matches!(
            event.kind,
            WindowEventKind::WindowStateChanged | WindowEventKind::ViewClicked | WindowEventKind::ViewFocused
        ) {
            signals.push(MonitorSignal::ForegroundChanged(package.to_string()));
        }
        if package == self.system_surface_id {
            match event.kind {
                WindowEventKind::ContentChanged if event.text.iter().any(|t| is_failure_text(t)) => {
                    signals.push(MonitorSignal::AuthSurfaceFailureText);
                }
                WindowEventKind::ViewClicked => signals.push(MonitorSignal::AuthSurfaceClick),
                _ => {}
            }
        }
        signals
    }
}

pub fn is_failure_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    FAILURE_PHRASES.iter().any(|p| lower.contains(p))
}

//! Intruder log entries: one per breach response, kept for the owner to review.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alert::BreachReason;
use crate::orchestrator::DispatchOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntruderRecord {
    pub id: Uuid,
    pub reason: BreachReason,
    pub target: String,
    pub occurred_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_link: Option<String>,
    pub outcome: DispatchOutcome,
}

impl IntruderRecord {
    pub fn new(reason: BreachReason, target: impl Into<String>, occurred_at_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason,
            target: target.into(),
            occurred_at_ms,
            evidence_path: None,
            location_link: None,
            evidence_link: None,
            outcome: DispatchOutcome::Queued,
        }
    }

    pub fn with_evidence(mut self, path: Option<&Path>, link: Option<String>) -> Self {
        self.evidence_path = path.map(|p| p.display().to_string());
        self.evidence_link = link;
        self
    }

    pub fn with_location(mut self, link: Option<String>) -> Self {
        self.location_link = link;
        self
    }

    pub fn with_outcome(mut self, outcome: DispatchOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

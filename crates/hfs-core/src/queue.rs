//! Offline alert queue: a single durable slot for the alert that could not be
//! sent, fired as soon as a channel reappears.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::channel::AlertRouter;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::rate_limiter::RateLimiter;
use crate::store::SettingsStore;

/// The single alert waiting for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAlert {
    /// Fully composed alert text.
    pub body: String,
    pub queued_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Sent and cleared.
    Delivered,
    /// Still no live channel; the record is kept.
    StillNoChannel,
    /// Nothing parked.
    NoPending,
    /// Window exhausted; the record is kept for a later flush.
    RateLimited,
    /// Transport refused; the record is kept.
    TransmitFailed,
}

/// Durable single-slot queue for an alert that found no channel.
pub struct OfflineQueue {
    store: Arc<SettingsStore>,
    router: Arc<AlertRouter>,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    flush_gate: tokio::sync::Mutex<()>,
}

impl OfflineQueue {
    pub fn new(
        store: Arc<SettingsStore>,
        router: Arc<AlertRouter>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            router,
            limiter,
            clock,
            flush_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Parks `body`, replacing any alert already waiting.
    pub fn enqueue(&self, body: &str) -> Result<(), StoreError> {
        let alert = PendingAlert {
            body: body.to_string(),
            queued_at_ms: self.clock.now_ms(),
        };
        self.store.set_pending_alert(&alert)?;
        tracing::info!(target: "hfs::queue", "alert parked until a channel is available");
        Ok(())
    }

    pub fn pending(&self) -> Result<Option<PendingAlert>, StoreError> {
        self.store.pending_alert()
    }

    /// Tries to deliver the parked alert. Invokes the router at most once.
    pub async fn flush_if_possible(&self) -> FlushOutcome {
        let _gate = self.flush_gate.lock().await;

        let pending = match self.store.pending_alert() {
            Ok(Some(p)) => p,
            Ok(None) => return FlushOutcome::NoPending,
            Err(e) => {
                tracing::error!(target: "hfs::queue", error = %e, "pending alert unreadable");
                return FlushOutcome::NoPending;
            }
        };

        let Some(permit) = self.limiter.acquire().await else {
            tracing::warn!(target: "hfs::queue", "flush deferred: alert window exhausted");
            return FlushOutcome::RateLimited;
        };

        let Some(channel) = self.router.select_channel() else {
            return FlushOutcome::StillNoChannel;
        };

        match self.router.transmit(&channel, &pending.body).await {
            Ok(()) => {
                if let Err(e) = self.store.clear_pending_alert() {
                    tracing::error!(target: "hfs::queue", error = %e, "delivered alert could not be cleared");
                }
                permit.commit();
                tracing::info!(
                    target: "hfs::queue",
                    queued_for_ms = self.clock.now_ms() - pending.queued_at_ms,
                    "parked alert delivered"
                );
                FlushOutcome::Delivered
            }
            Err(e) => {
                tracing::warn!(target: "hfs::queue", error = %e, "parked alert transmit failed");
                FlushOutcome::TransmitFailed
            }
        }
    }
}

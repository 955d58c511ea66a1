//! Concurrent backfills with a cap on how many scan at once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sentinel_core::models::{BackfillReport, OperatorId, SourceId};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backfill::BackfillProcessor;

type InFlight = Arc<Mutex<HashMap<SourceId, CancellationToken>>>;

/// Spawns backfills as independent tasks.
///
/// At most `max_concurrent` scans hold a permit at a time; the rest wait
/// their turn. A source can only have one backfill in flight.
#[derive(Debug, Clone)]
pub struct BackfillScheduler {
    processor: Arc<BackfillProcessor>,
    permits: Arc<Semaphore>,
    in_flight: InFlight,
}

impl BackfillScheduler {
    pub fn new(processor: BackfillProcessor, max_concurrent: usize) -> Self {
        Self {
            processor: Arc::new(processor),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a backfill of `source_id` on behalf of `requester`.
    ///
    /// Returns `None` when a backfill of that source is already running.
    pub fn launch(
        &self,
        source_id: SourceId,
        requester: OperatorId,
    ) -> Option<JoinHandle<BackfillReport>> {
        let token = {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains_key(&source_id) {
                debug!(source_id, "backfill already in flight");
                return None;
            }
            let token = CancellationToken::new();
            in_flight.insert(source_id, token.clone());
            token
        };

        let processor = self.processor.clone();
        let permits = self.permits.clone();
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            source_id,
        };

        info!(source_id, requester, "backfill scheduled");
        Some(tokio::spawn(async move {
            let _guard = guard;
            // Cancelled while queued: the run below stops before its first
            // fetch and only reports the cancellation to the requester.
            let _permit = tokio::select! {
                _ = token.cancelled() => None,
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => {
                        token.cancel();
                        None
                    }
                },
            };
            processor.run_with_cancel(source_id, requester, &token).await
        }))
    }

    /// Launch one backfill per source, skipping sources already in flight.
    pub fn launch_many(
        &self,
        source_ids: &[SourceId],
        requester: OperatorId,
    ) -> Vec<JoinHandle<BackfillReport>> {
        source_ids
            .iter()
            .filter_map(|&id| self.launch(id, requester))
            .collect()
    }

    /// Cancel the backfill of `source_id`. Returns `false` when none runs.
    pub fn cancel(&self, source_id: SourceId) -> bool {
        match self.in_flight.lock().get(&source_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running and queued backfill. Later launches are
    /// unaffected.
    pub fn cancel_all(&self) {
        for token in self.in_flight.lock().values() {
            token.cancel();
        }
    }

    /// Sources with a backfill queued or running, in ascending order.
    pub fn in_flight(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.in_flight.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Drops the in-flight entry when the task finishes, however it finishes.
struct InFlightGuard {
    in_flight: InFlight,
    source_id: SourceId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.source_id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

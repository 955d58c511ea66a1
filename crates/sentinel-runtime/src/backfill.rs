//! One-time scan of a source's message history.
//!
//! History is read newest to oldest in pages. Hits are sent only to the
//! operator who asked for the scan, followed by a summary once the run ends.
//! The source is marked backfilled only when the scan reached the oldest
//! message or the scan ceiling; an aborted or cancelled run leaves it
//! unmarked so it can be retried.

use sentinel_core::formatting::{format_backfill_summary, format_notification};
use sentinel_core::matcher::find_keyword;
use sentinel_core::models::{
    BackfillOutcome, BackfillReport, HistoryCursor, OperatorId, RawMessage, Source, SourceId,
};
use sentinel_core::settings::BackfillConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::WatchContext;
use crate::enrich::build_match_event;

/// Runs backfills against a shared [`WatchContext`].
#[derive(Debug, Clone)]
pub struct BackfillProcessor {
    ctx: WatchContext,
    config: BackfillConfig,
}

impl BackfillProcessor {
    pub fn new(ctx: WatchContext, config: BackfillConfig) -> Self {
        Self { ctx, config }
    }

    /// Scan the history of `source_id` and report hits to `requester`.
    pub async fn run(&self, source_id: SourceId, requester: OperatorId) -> BackfillReport {
        self.run_with_cancel(source_id, requester, &CancellationToken::new())
            .await
    }

    /// Like [`BackfillProcessor::run`], stopping at the next page boundary
    /// once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        source_id: SourceId,
        requester: OperatorId,
        cancel: &CancellationToken,
    ) -> BackfillReport {
        info!(source_id, requester, "processing history");

        let Some(source) = self.ctx.store.source(source_id) else {
            warn!(source_id, "source not found");
            return BackfillReport::skipped(source_id, BackfillOutcome::UnknownSource);
        };
        if source.backfilled {
            info!(source_id, "source already processed");
            return BackfillReport::skipped(source_id, BackfillOutcome::AlreadyBackfilled);
        }
        let keywords = self.ctx.store.keywords();
        if keywords.is_empty() {
            warn!(source_id, "no keywords to search");
            return BackfillReport::skipped(source_id, BackfillOutcome::NoKeywords);
        }

        let report = self.scan(&source, &keywords, requester, cancel).await;

        if report.outcome.is_complete() {
            match self.ctx.store.mark_backfilled(source_id) {
                Ok(true) => {}
                Ok(false) => warn!(source_id, "source removed during backfill; not marked"),
                Err(e) => error!(source_id, error = %e, "failed to mark source backfilled"),
            }
        }

        info!(
            source_id,
            scanned = report.scanned,
            matched = report.matched,
            outcome = ?report.outcome,
            "history processed"
        );

        let summary = format_backfill_summary(&source.title, &report);
        let delivery = self.ctx.dispatcher.dispatch(&summary, &[requester]).await;
        if delivery.failed > 0 {
            error!(source_id, requester, "failed to send backfill summary");
        }

        report
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn scan(
        &self,
        source: &Source,
        keywords: &[String],
        requester: OperatorId,
        cancel: &CancellationToken,
    ) -> BackfillReport {
        let page_size = self.config.page_size.max(1) as u64;
        let limit = self.config.history_limit;
        let mut cursor = HistoryCursor::Latest;
        let mut scanned = 0u64;
        let mut matched = 0u64;

        let outcome = loop {
            if cancel.is_cancelled() {
                break BackfillOutcome::Cancelled;
            }

            let remaining = limit.saturating_sub(scanned);
            if remaining == 0 {
                break BackfillOutcome::CeilingReached;
            }
            let requested = page_size.min(remaining) as usize;

            let page = match self
                .ctx
                .transport
                .fetch_history_page(source.id, cursor, requested)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(source_id = source.id, scanned, error = %e, "error fetching history batch");
                    break BackfillOutcome::Aborted {
                        reason: e.to_string(),
                    };
                }
            };
            debug!(source_id = source.id, ?cursor, fetched = page.len(), "history page fetched");

            for message in &page {
                scanned += 1;
                if self.process_message(source, message, keywords, requester).await {
                    matched += 1;
                }
            }

            let Some(oldest) = page.last() else {
                break BackfillOutcome::Exhausted;
            };
            if page.len() < requested {
                break BackfillOutcome::Exhausted;
            }
            if scanned >= limit {
                break BackfillOutcome::CeilingReached;
            }
            cursor = HistoryCursor::Before(oldest.id);

            tokio::select! {
                _ = cancel.cancelled() => break BackfillOutcome::Cancelled,
                _ = tokio::time::sleep(self.config.batch_delay) => {}
            }
        };

        BackfillReport {
            source_id: source.id,
            scanned,
            matched,
            outcome,
        }
    }

    /// Returns `true` when the message matched a keyword.
    async fn process_message(
        &self,
        source: &Source,
        message: &RawMessage,
        keywords: &[String],
        requester: OperatorId,
    ) -> bool {
        let Some(text) = message.text() else {
            return false;
        };
        let Some(keyword) = find_keyword(text, keywords) else {
            return false;
        };
        debug!(source_id = source.id, message_id = message.id, keyword, "keyword found in history");

        let event = build_match_event(&self.ctx, source, message, keyword, text).await;
        self.ctx
            .dispatcher
            .dispatch(&format_notification(&event), &[requester])
            .await;
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Standing subscription to new messages in registered sources.
//!
//! Every live hit goes to all operators. A new [`LiveMonitor::subscribe`]
//! call replaces the previous subscription, so the source set is whatever
//! was registered at the time of the latest call.

use futures::StreamExt;
use parking_lot::Mutex;
use sentinel_core::formatting::format_notification;
use sentinel_core::matcher::find_keyword;
use sentinel_core::models::{RawMessage, Source, SourceId};
use sentinel_core::ports::MessageStream;
use sentinel_core::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::WatchContext;
use crate::enrich::build_match_event;

/// What happened to one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveDecision {
    NotRunning,
    NotificationsOff,
    UnknownSource,
    NoText,
    NoKeywords,
    NoMatch,
    Notified { keyword: String, delivered: usize },
}

struct Subscription {
    token: CancellationToken,
    handle: JoinHandle<()>,
    sources: Vec<SourceId>,
}

pub struct LiveMonitor {
    ctx: WatchContext,
    subscription: Mutex<Option<Subscription>>,
}

impl LiveMonitor {
    pub fn new(ctx: WatchContext) -> Self {
        Self {
            ctx,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribe to every registered source, replacing any previous
    /// subscription. Returns the number of sources covered.
    ///
    /// With no registered sources nothing is subscribed and any previous
    /// subscription is stopped. Otherwise the run flag is switched on.
    pub async fn subscribe(&self) -> Result<usize> {
        let sources = self.ctx.store.source_ids();
        if sources.is_empty() {
            warn!("no sources registered; live monitoring not started");
            self.stop();
            return Ok(0);
        }

        let stream = self.ctx.transport.subscribe_new_messages(&sources).await?;
        if !self.ctx.store.run_state().is_running {
            self.ctx.store.set_running(true)?;
            info!("monitoring switched on");
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_subscription(
            self.ctx.clone(),
            stream,
            token.clone(),
        ));

        let count = sources.len();
        let previous = self.subscription.lock().replace(Subscription {
            token,
            handle,
            sources,
        });
        if let Some(previous) = previous {
            debug!(sources = previous.sources.len(), "replacing live subscription");
            previous.token.cancel();
        }

        info!(sources = count, "live monitoring subscribed");
        Ok(count)
    }

    /// Stop the current subscription. Returns `false` if none was active.
    pub fn stop(&self) -> bool {
        match self.subscription.lock().take() {
            Some(subscription) => {
                subscription.token.cancel();
                info!("live monitoring stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Sources covered by the current subscription.
    pub fn subscribed_sources(&self) -> Vec<SourceId> {
        self.subscription
            .lock()
            .as_ref()
            .map(|s| s.sources.clone())
            .unwrap_or_default()
    }

    /// Run one message through the live pipeline.
    pub async fn handle_message(&self, message: RawMessage) -> LiveDecision {
        handle_message(&self.ctx, message).await
    }
}

impl Drop for LiveMonitor {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get_mut().take() {
            subscription.token.cancel();
        }
    }
}

impl std::fmt::Debug for LiveMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMonitor")
            .field("ctx", &self.ctx)
            .field("sources", &self.subscribed_sources())
            .finish()
    }
}

// ── Private implementation ────────────────────────────────────────────────────

async fn run_subscription(ctx: WatchContext, mut stream: MessageStream, token: CancellationToken) {
    loop {
        let message = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("live subscription cancelled");
                break;
            }
            next = stream.next() => match next {
                Some(message) => message,
                None => {
                    info!("live message stream ended");
                    break;
                }
            },
        };

        let message_id = message.id;
        let chat_id = message.chat_id;
        let decision = handle_message(&ctx, message).await;
        debug!(message_id, chat_id, ?decision, "live message handled");
    }
}

async fn handle_message(ctx: &WatchContext, message: RawMessage) -> LiveDecision {
    let (source, keyword, text) = match triage(ctx, &message) {
        Ok(hit) => hit,
        Err(decision) => return decision,
    };
    info!(source_id = source.id, message_id = message.id, keyword = %keyword, "keyword found");

    let event = build_match_event(ctx, &source, &message, &keyword, &text).await;
    let recipients = ctx.store.operators().to_vec();
    let summary = ctx
        .dispatcher
        .dispatch(&format_notification(&event), &recipients)
        .await;

    LiveDecision::Notified {
        keyword,
        delivered: summary.delivered,
    }
}

/// Apply the gates in order against a single store snapshot.
fn triage(
    ctx: &WatchContext,
    message: &RawMessage,
) -> std::result::Result<(Source, String, String), LiveDecision> {
    let snapshot = ctx.store.snapshot();

    if !snapshot.run_state.is_running {
        return Err(LiveDecision::NotRunning);
    }
    if !snapshot.run_state.notifications_enabled {
        return Err(LiveDecision::NotificationsOff);
    }
    let source = snapshot
        .source(message.chat_id)
        .cloned()
        .ok_or(LiveDecision::UnknownSource)?;
    let text = message.text().ok_or(LiveDecision::NoText)?;
    if snapshot.keywords.is_empty() {
        return Err(LiveDecision::NoKeywords);
    }
    let keyword = find_keyword(text, &snapshot.keywords).ok_or(LiveDecision::NoMatch)?;

    Ok((source, keyword.to_string(), text.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

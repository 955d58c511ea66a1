//! Best-effort resolution of the optional parts of a [`MatchEvent`].
//!
//! Lookup failures are logged at debug level and leave the field empty; they
//! never fail the message being processed.

use sentinel_core::models::{MatchEvent, RawMessage, Source, SourceKind};

use crate::context::WatchContext;

const UNKNOWN_SENDER: &str = "Unknown";

/// Build the event for a keyword hit in `message`.
pub async fn build_match_event(
    ctx: &WatchContext,
    source: &Source,
    message: &RawMessage,
    keyword: &str,
    text: &str,
) -> MatchEvent {
    let sender = match ctx.transport.resolve_sender(message).await {
        Ok(sender) => Some(sender),
        Err(e) => {
            tracing::debug!(message_id = message.id, error = %e, "sender lookup failed");
            None
        }
    };

    let message_link = match ctx.transport.permalink(message).await {
        Ok(link) => link,
        Err(e) => {
            tracing::debug!(message_id = message.id, error = %e, "permalink lookup failed");
            None
        }
    };

    let parent_title = parent_title(ctx, source).await;

    let (sender_id, sender_display_name, sender_handle) = match sender {
        Some(s) => (Some(s.id), s.display_name, s.handle),
        None => (message.sender_id, UNKNOWN_SENDER.to_string(), None),
    };

    MatchEvent {
        keyword: keyword.to_string(),
        sender_id,
        sender_display_name,
        sender_handle,
        source: source.clone(),
        message_text: text.to_string(),
        message_link,
        parent_title,
    }
}

/// Title of the channel owning a discussion source: the registered source
/// first, then the transport.
///
/// A discussion registered without a parent id is matched to the channel
/// that lists it as its linked discussion.
async fn parent_title(ctx: &WatchContext, source: &Source) -> Option<String> {
    if source.kind != SourceKind::Discussion {
        return None;
    }
    let Some(parent_id) = source.parent_id else {
        return ctx
            .store
            .snapshot()
            .sources
            .into_values()
            .find(|s| s.discussion_id == Some(source.id))
            .map(|s| s.title);
    };

    if let Some(parent) = ctx.store.source(parent_id) {
        return Some(parent.title);
    }

    match ctx.transport.resolve_entity(parent_id).await {
        Ok(entity) => Some(entity.title),
        Err(e) => {
            tracing::debug!(parent_id, error = %e, "parent channel lookup failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, message, FakeTransport, RecordingNotifier};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_full_resolution() {
        let transport = Arc::new(
            FakeTransport::new()
                .with_entity(-100123, "News", Some("news"))
                .with_sender(555, "Ada", Some("ada")),
        );
        let ctx = context(transport, Arc::new(RecordingNotifier::new()), 1);
        let source = Source::channel(-100123, "News");
        let msg = message(-100123, 7, "urgent");

        let event = build_match_event(&ctx, &source, &msg, "urgent", "urgent").await;
        assert_eq!(event.sender_id, Some(555));
        assert_eq!(event.sender_display_name, "Ada");
        assert_eq!(event.sender_handle.as_deref(), Some("ada"));
        assert_eq!(event.message_link.as_deref(), Some("https://t.me/news/7"));
        assert!(event.parent_title.is_none());
    }

    #[tokio::test]
    async fn test_failed_lookups_degrade() {
        let ctx = context(
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingNotifier::new()),
            1,
        );
        let source = Source::group(-100999, "Chat");
        let msg = message(-100999, 7, "urgent");

        let event = build_match_event(&ctx, &source, &msg, "urgent", "urgent").await;
        assert_eq!(event.sender_id, Some(555));
        assert_eq!(event.sender_display_name, "Unknown");
        assert!(event.sender_handle.is_none());
        assert!(event.message_link.is_none());
    }

    #[tokio::test]
    async fn test_parent_title_from_store() {
        let ctx = context(
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingNotifier::new()),
            1,
        );
        ctx.store
            .add_source(Source::channel(-100123, "News"))
            .unwrap();
        let discussion = Source::discussion(-100200, "Comments", Some(-100123));

        assert_eq!(parent_title(&ctx, &discussion).await.as_deref(), Some("News"));
    }

    #[tokio::test]
    async fn test_parent_title_from_linked_channel() {
        let ctx = context(
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingNotifier::new()),
            1,
        );
        ctx.store
            .add_source(Source::channel(-100123, "News").with_discussion(-100200))
            .unwrap();
        ctx.store.add_source(Source::channel(-100999, "Other")).unwrap();
        let discussion = Source::discussion(-100200, "Comments", None);

        assert_eq!(parent_title(&ctx, &discussion).await.as_deref(), Some("News"));
    }

    #[tokio::test]
    async fn test_parent_title_falls_back_to_transport() {
        let transport = Arc::new(FakeTransport::new().with_entity(-100123, "Remote News", None));
        let ctx = context(transport, Arc::new(RecordingNotifier::new()), 1);
        let discussion = Source::discussion(-100200, "Comments", Some(-100123));

        assert_eq!(
            parent_title(&ctx, &discussion).await.as_deref(),
            Some("Remote News")
        );
    }

    #[tokio::test]
    async fn test_parent_title_absent_or_unresolvable() {
        let ctx = context(
            Arc::new(FakeTransport::new()),
            Arc::new(RecordingNotifier::new()),
            1,
        );
        let orphan = Source::discussion(-100200, "Comments", None);
        let dangling = Source::discussion(-100200, "Comments", Some(-100404));
        let channel = Source::channel(-100123, "News");

        assert!(parent_title(&ctx, &orphan).await.is_none());
        assert!(parent_title(&ctx, &dangling).await.is_none());
        assert!(parent_title(&ctx, &channel).await.is_none());
    }
}

//! Rendering of match notifications, deep links and backfill summaries.
//!
//! Output is Telegram-flavoured HTML; every user-supplied string is escaped
//! before it is embedded.

use serde::{Deserialize, Serialize};

use crate::models::{BackfillOutcome, BackfillReport, MatchEvent, MessageId, SourceId, SourceKind};

/// Maximum number of characters of the message shown in a notification.
pub const PREVIEW_CHARS: usize = 200;

const ELLIPSIS: &str = "...";

// ── Types ─────────────────────────────────────────────────────────────────────

/// A button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLink {
    pub label: String,
    pub url: String,
}

impl ActionLink {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// A rendered notification ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Notification {
    pub text: String,
    pub links: Vec<ActionLink>,
}

impl Notification {
    /// A notification without any buttons.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            links: Vec::new(),
        }
    }
}

// ── Links ─────────────────────────────────────────────────────────────────────

/// Permalink to a message.
///
/// Public chats use `https://t.me/<handle>/<id>`; private chats use the
/// `https://t.me/c/<internal id>/<id>` form, where the internal id is the
/// native id without its `-100` prefix.
///
/// ```
/// use sentinel_core::formatting::message_link;
///
/// assert_eq!(message_link(-1001234, Some("news"), 7), "https://t.me/news/7");
/// assert_eq!(message_link(-1001234, None, 7), "https://t.me/c/1234/7");
/// ```
pub fn message_link(chat_id: SourceId, handle: Option<&str>, message_id: MessageId) -> String {
    match handle.filter(|h| !h.is_empty()) {
        Some(handle) => format!("https://t.me/{}/{}", handle, message_id),
        None => format!("https://t.me/c/{}/{}", internal_chat_id(chat_id), message_id),
    }
}

/// Deep link that opens a conversation with a user.
pub fn sender_link(sender_id: i64, handle: Option<&str>) -> String {
    match handle.filter(|h| !h.is_empty()) {
        Some(handle) => format!("https://t.me/{}", handle),
        None => format!("tg://user?id={}", sender_id),
    }
}

fn internal_chat_id(chat_id: SourceId) -> String {
    let native = chat_id.to_string();
    match native.strip_prefix("-100") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => chat_id.unsigned_abs().to_string(),
    }
}

// ── Text helpers ──────────────────────────────────────────────────────────────

/// Truncate `text` to [`PREVIEW_CHARS`] characters, appending `...` when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Escape the characters that are significant in Telegram HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

// ── Notifications ─────────────────────────────────────────────────────────────

/// Render a keyword hit into text plus up to two action links.
pub fn format_notification(event: &MatchEvent) -> Notification {
    let mut text = String::from("🔔 <b>Keyword found!</b>\n\n");
    text.push_str(&format!(
        "🔑 <b>Keyword:</b> {}\n\n",
        escape_html(&event.keyword)
    ));

    text.push_str("👤 <b>Sender:</b>\n");
    text.push_str(&format!(
        "├ Name: {}\n",
        escape_html(&event.sender_display_name)
    ));
    if let Some(handle) = &event.sender_handle {
        text.push_str(&format!("├ Username: @{}\n", escape_html(handle)));
    }
    match event.sender_id {
        Some(id) => text.push_str(&format!("└ ID: <code>{}</code>\n\n", id)),
        None => text.push_str("└ ID: unknown\n\n"),
    }

    let source = &event.source;
    text.push_str("💬 <b>Source:</b>\n");
    text.push_str(&format!("├ Type: {}\n", source.kind.label()));
    if source.kind == SourceKind::Discussion {
        if let Some(parent) = &event.parent_title {
            text.push_str(&format!("├ Channel: {}\n", escape_html(parent)));
        }
    }
    text.push_str(&format!("├ Title: {}\n", escape_html(&source.title)));
    match &source.handle {
        Some(handle) => text.push_str(&format!("└ Username: @{}\n", escape_html(handle))),
        None => text.push_str("└ Username: none\n"),
    }

    text.push_str("\n📝 <b>Message:</b>\n");
    text.push_str(&format!(
        "<i>{}</i>",
        escape_html(&preview(&event.message_text))
    ));

    let mut links = Vec::with_capacity(2);
    if let Some(url) = &event.message_link {
        links.push(ActionLink::new("🔗 Open message", url.clone()));
    }
    if let Some(id) = event.sender_id {
        links.push(ActionLink::new(
            "💬 Message sender",
            sender_link(id, event.sender_handle.as_deref()),
        ));
    }

    Notification { text, links }
}

/// One-line-per-fact summary sent to whoever launched a backfill.
pub fn format_backfill_summary(source_title: &str, report: &BackfillReport) -> Notification {
    let headline = match &report.outcome {
        BackfillOutcome::Exhausted => "✅ <b>History scan complete</b>".to_string(),
        BackfillOutcome::CeilingReached => {
            "✅ <b>History scan complete</b> (scan limit reached)".to_string()
        }
        BackfillOutcome::Aborted { reason } => format!(
            "⚠️ <b>History scan aborted</b>: {}\nThe source stays unscanned and can be retried.",
            escape_html(reason)
        ),
        BackfillOutcome::Cancelled => "⏹ <b>History scan cancelled</b>".to_string(),
        BackfillOutcome::AlreadyBackfilled => "ℹ️ <b>History already scanned</b>".to_string(),
        BackfillOutcome::NoKeywords => "ℹ️ <b>No keywords to search</b>".to_string(),
        BackfillOutcome::UnknownSource => "ℹ️ <b>Source not found</b>".to_string(),
    };

    Notification::plain(format!(
        "{}\n\n📊 Source: {}\n📝 Messages scanned: {}\n🔍 Matches found: {}",
        headline,
        escape_html(source_title),
        report.scanned,
        report.matched
    ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};

/// Transport-native chat identifier (channels and supergroups are negative).
pub type SourceId = i64;
/// Identifier of an operator who receives notifications.
pub type OperatorId = i64;
/// Message identifier, unique and increasing within one chat.
pub type MessageId = i64;

/// The flavour of chat a source represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A broadcast channel.
    Channel,
    /// A group or supergroup.
    Group,
    /// The comment thread attached to a channel.
    Discussion,
}

impl SourceKind {
    /// Human-readable label used in notifications.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Channel => "Channel",
            SourceKind::Group => "Group",
            SourceKind::Discussion => "Channel comments",
        }
    }
}

/// A chat registered for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub kind: SourceKind,
    pub title: String,
    /// Public handle without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Owning channel; only set for [`SourceKind::Discussion`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<SourceId>,
    /// Linked comment group of a channel, when one was registered with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discussion_id: Option<SourceId>,
    /// Set once the full history has been scanned.
    #[serde(default)]
    pub backfilled: bool,
}

impl Source {
    pub fn channel(id: SourceId, title: impl Into<String>) -> Self {
        Self::new(id, SourceKind::Channel, title)
    }

    pub fn group(id: SourceId, title: impl Into<String>) -> Self {
        Self::new(id, SourceKind::Group, title)
    }

    pub fn discussion(id: SourceId, title: impl Into<String>, parent_id: Option<SourceId>) -> Self {
        Self {
            parent_id,
            ..Self::new(id, SourceKind::Discussion, title)
        }
    }

    fn new(id: SourceId, kind: SourceKind, title: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            title: title.into(),
            handle: None,
            parent_id: None,
            discussion_id: None,
            backfilled: false,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_discussion(mut self, discussion_id: SourceId) -> Self {
        self.discussion_id = Some(discussion_id);
        self
    }
}

/// Global gates consulted by the live monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub is_running: bool,
    pub notifications_enabled: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            is_running: false,
            notifications_enabled: true,
        }
    }
}

/// Recipients of match notifications.
///
/// The primary operator is always a member and is always listed first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSet {
    primary: OperatorId,
    #[serde(default)]
    others: Vec<OperatorId>,
}

impl OperatorSet {
    pub fn new(primary: OperatorId) -> Self {
        Self {
            primary,
            others: Vec::new(),
        }
    }

    pub fn primary(&self) -> OperatorId {
        self.primary
    }

    pub fn contains(&self, id: OperatorId) -> bool {
        self.primary == id || self.others.contains(&id)
    }

    /// All operators, primary first, in insertion order.
    pub fn to_vec(&self) -> Vec<OperatorId> {
        std::iter::once(self.primary)
            .chain(self.others.iter().copied())
            .collect()
    }

    /// Returns `false` when `id` is already a member.
    pub fn add(&mut self, id: OperatorId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.others.push(id);
        true
    }

    /// Returns `Ok(false)` when `id` is not a member.
    pub fn remove(&mut self, id: OperatorId) -> Result<bool> {
        if id == self.primary {
            return Err(SentinelError::PrimaryOperator(id));
        }
        let before = self.others.len();
        self.others.retain(|&op| op != id);
        Ok(self.others.len() != before)
    }

    /// Install `id` as primary; a displaced primary stays on as a regular operator.
    pub fn promote(&mut self, id: OperatorId) {
        if id == self.primary {
            return;
        }
        let previous = std::mem::replace(&mut self.primary, id);
        self.others.retain(|&op| op != id);
        self.others.insert(0, previous);
    }
}

/// The full persisted aggregate: sources, keywords, run flags and operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub sources: BTreeMap<SourceId, Source>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub run_state: RunState,
    pub operators: OperatorSet,
}

impl StoreSnapshot {
    /// A fresh aggregate with nothing registered and `primary` as the only operator.
    pub fn new(primary: OperatorId) -> Self {
        Self {
            sources: BTreeMap::new(),
            keywords: Vec::new(),
            run_state: RunState::default(),
            operators: OperatorSet::new(primary),
        }
    }

    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(&id)
    }
}

/// Where the next history page should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCursor {
    /// Start from the most recent message.
    Latest,
    /// Only messages strictly older than this id.
    Before(MessageId),
}

/// A message as delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    pub chat_id: SourceId,
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl RawMessage {
    /// Message text, treating whitespace-only text as absent.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Display data of a chat resolved through the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub title: String,
    #[serde(default)]
    pub handle: Option<String>,
}

/// Display data of a message author resolved through the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInfo {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub handle: Option<String>,
}

/// Everything the formatter needs to render one keyword hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    pub keyword: String,
    pub sender_id: Option<i64>,
    pub sender_display_name: String,
    pub sender_handle: Option<String>,
    pub source: Source,
    pub message_text: String,
    pub message_link: Option<String>,
    pub parent_title: Option<String>,
}

/// How a backfill run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// The source was already fully scanned; nothing was fetched.
    AlreadyBackfilled,
    /// No keywords are registered; nothing was fetched.
    NoKeywords,
    /// The source is not registered.
    UnknownSource,
    /// The oldest message was reached.
    Exhausted,
    /// The scan ceiling was reached before the oldest message.
    CeilingReached,
    /// A page fetch failed; remaining history was not scanned.
    Aborted { reason: String },
    /// The run was cancelled at a page boundary.
    Cancelled,
}

impl BackfillOutcome {
    /// `true` for the outcomes that mark the source as backfilled.
    pub fn is_complete(&self) -> bool {
        matches!(self, BackfillOutcome::Exhausted | BackfillOutcome::CeilingReached)
    }

    /// `true` when the run short-circuited without touching the transport.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            BackfillOutcome::AlreadyBackfilled
                | BackfillOutcome::NoKeywords
                | BackfillOutcome::UnknownSource
        )
    }
}

/// Counts and outcome of one backfill run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub source_id: SourceId,
    pub scanned: u64,
    pub matched: u64,
    pub outcome: BackfillOutcome,
}

impl BackfillReport {
    /// A zero-count report for a run that never started scanning.
    pub fn skipped(source_id: SourceId, outcome: BackfillOutcome) -> Self {
        Self {
            source_id,
            scanned: 0,
            matched: 0,
            outcome,
        }
    }
}

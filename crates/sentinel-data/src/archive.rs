//! A [`ChatTransport`] backed by exported chat logs on disk.
//!
//! Layout of the archive directory:
//!
//! ```text
//! archive/
//! ├── entities.json        optional: {"chats": {id: {title, handle}}, "users": {id: {display_name, handle}}}
//! ├── -100123.jsonl        one message per line, oldest first
//! └── exports/-100456.jsonl
//! ```
//!
//! Files are discovered recursively; the file stem is the source id. Live
//! subscriptions poll the subscribed files and yield messages whose id is
//! above the highest id seen when the subscription started.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::error::TransportError;
use sentinel_core::models::{
    EntityInfo, HistoryCursor, MessageId, RawMessage, SenderInfo, SourceId,
};
use sentinel_core::ports::{ChatTransport, MessageStream};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const ENTITIES_FILE: &str = "entities.json";

// ── On-disk shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ArchivedMessage {
    id: MessageId,
    #[serde(default)]
    sender_id: Option<i64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ArchivedUser {
    display_name: String,
    #[serde(default)]
    handle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedEntities {
    #[serde(default)]
    chats: HashMap<SourceId, EntityInfo>,
    #[serde(default)]
    users: HashMap<i64, ArchivedUser>,
}

// ── ArchiveTransport ──────────────────────────────────────────────────────────

/// Read-only chat transport over an archive directory.
#[derive(Debug, Clone)]
pub struct ArchiveTransport {
    root: PathBuf,
    poll_interval: Duration,
}

impl ArchiveTransport {
    pub fn new(root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            poll_interval,
        }
    }

    /// Source ids that have an export file under the archive root.
    pub fn archived_sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = find_source_files(&self.root).into_keys().collect();
        ids.sort_unstable();
        ids
    }

    fn load_entities(&self) -> Result<ArchivedEntities, TransportError> {
        let path = self.root.join(ENTITIES_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ArchivedEntities::default())
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| TransportError::Other(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ChatTransport for ArchiveTransport {
    async fn subscribe_new_messages(
        &self,
        source_ids: &[SourceId],
    ) -> Result<MessageStream, TransportError> {
        let files = find_source_files(&self.root);
        let mut marks: HashMap<SourceId, MessageId> = HashMap::new();
        for &id in source_ids {
            let mark = files
                .get(&id)
                .map(|path| read_messages(path, id))
                .transpose()?
                .and_then(|messages| messages.iter().map(|m| m.id).max())
                .unwrap_or(0);
            marks.insert(id, mark);
        }

        let (tx, rx) = mpsc::channel(64);
        let root = self.root.clone();
        let interval = self.poll_interval;
        tokio::spawn(async move {
            poll_loop(root, interval, marks, tx).await;
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn fetch_history_page(
        &self,
        source_id: SourceId,
        cursor: HistoryCursor,
        page_size: usize,
    ) -> Result<Vec<RawMessage>, TransportError> {
        let files = find_source_files(&self.root);
        let path = files
            .get(&source_id)
            .ok_or_else(|| TransportError::NotFound(format!("no archive for {}", source_id)))?;

        let mut messages = read_messages(path, source_id)?;
        if let HistoryCursor::Before(before) = cursor {
            messages.retain(|m| m.id < before);
        }
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.truncate(page_size);
        Ok(messages)
    }

    async fn resolve_entity(&self, id: SourceId) -> Result<EntityInfo, TransportError> {
        self.load_entities()?
            .chats
            .remove(&id)
            .ok_or_else(|| TransportError::NotFound(format!("chat {}", id)))
    }

    async fn resolve_sender(&self, message: &RawMessage) -> Result<SenderInfo, TransportError> {
        let sender_id = message
            .sender_id
            .ok_or_else(|| TransportError::NotFound(format!("sender of {}", message.id)))?;
        let user = self
            .load_entities()?
            .users
            .remove(&sender_id)
            .ok_or_else(|| TransportError::NotFound(format!("user {}", sender_id)))?;
        Ok(SenderInfo {
            id: sender_id,
            display_name: user.display_name,
            handle: user.handle,
        })
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Forward new messages until the subscriber drops the stream.
async fn poll_loop(
    root: PathBuf,
    interval: Duration,
    mut marks: HashMap<SourceId, MessageId>,
    tx: mpsc::Sender<RawMessage>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; marks were taken just now.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if tx.is_closed() {
            debug!("archive subscription dropped; stopping poll loop");
            break;
        }

        let files = find_source_files(&root);
        for (id, mark) in marks.iter_mut() {
            let Some(path) = files.get(id) else { continue };
            let mut fresh = match read_messages(path, *id) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(source_id = *id, error = %e, "failed to poll archive file");
                    continue;
                }
            };
            fresh.retain(|m| m.id > *mark);
            fresh.sort_by_key(|m| m.id);

            for message in fresh {
                *mark = message.id;
                if tx.send(message).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Map every `<source_id>.jsonl` under `root` to its path.
fn find_source_files(root: &Path) -> HashMap<SourceId, PathBuf> {
    if !root.exists() {
        warn!("Archive path does not exist: {}", root.display());
        return HashMap::new();
    }

    walkdir::WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "jsonl")
                    .unwrap_or(false)
        })
        .filter_map(|entry| {
            let id = entry.path().file_stem()?.to_str()?.parse::<SourceId>().ok()?;
            Some((id, entry.into_path()))
        })
        .collect()
}

/// Parse one export file; malformed lines are skipped.
fn read_messages(path: &Path, chat_id: SourceId) -> Result<Vec<RawMessage>, TransportError> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut messages = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ArchivedMessage>(trimmed) {
            Ok(m) => messages.push(RawMessage {
                id: m.id,
                chat_id,
                sender_id: m.sender_id,
                text: m.text,
                date: m.date,
            }),
            Err(e) => {
                debug!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "skipping malformed archive line"
                );
            }
        }
    }

    Ok(messages)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_export(dir: &Path, id: SourceId, ids: &[MessageId]) -> PathBuf {
        let path = dir.join(format!("{}.jsonl", id));
        let mut file = std::fs::File::create(&path).unwrap();
        for mid in ids {
            writeln!(
                file,
                r#"{{"id": {}, "sender_id": 555, "text": "message {}"}}"#,
                mid, mid
            )
            .unwrap();
        }
        path
    }

    fn transport(dir: &TempDir) -> ArchiveTransport {
        ArchiveTransport::new(dir.path(), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_history_pages_newest_first() {
        let dir = TempDir::new().unwrap();
        write_export(dir.path(), -100123, &[1, 2, 3, 4, 5]);
        let t = transport(&dir);

        let first = t
            .fetch_history_page(-100123, HistoryCursor::Latest, 2)
            .await
            .unwrap();
        assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![5, 4]);
        assert!(first.iter().all(|m| m.chat_id == -100123));

        let second = t
            .fetch_history_page(-100123, HistoryCursor::Before(4), 2)
            .await
            .unwrap();
        assert_eq!(second.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 2]);

        let last = t
            .fetch_history_page(-100123, HistoryCursor::Before(2), 2)
            .await
            .unwrap();
        assert_eq!(last.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_history_missing_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = transport(&dir)
            .fetch_history_page(-1, HistoryCursor::Latest, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_export(dir.path(), -7, &[1]);
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, r#"{{"id": 2}}"#).unwrap();

        let page = transport(&dir)
            .fetch_history_page(-7, HistoryCursor::Latest, 10)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].text.is_none());
    }

    #[tokio::test]
    async fn test_nested_exports_are_discovered() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("exports");
        std::fs::create_dir_all(&nested).unwrap();
        write_export(&nested, -100456, &[1]);
        std::fs::write(nested.join("notes.jsonl"), "{}").unwrap();

        assert_eq!(transport(&dir).archived_sources(), vec![-100456]);
    }

    #[tokio::test]
    async fn test_entities_resolution() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(ENTITIES_FILE),
            r#"{"chats": {"-100123": {"title": "News", "handle": "news"}},
                "users": {"555": {"display_name": "Ada", "handle": "ada"}}}"#,
        )
        .unwrap();
        let t = transport(&dir);

        let chat = t.resolve_entity(-100123).await.unwrap();
        assert_eq!(chat.handle.as_deref(), Some("news"));
        assert!(t.resolve_entity(-1).await.is_err());

        let msg = RawMessage {
            id: 3,
            chat_id: -100123,
            sender_id: Some(555),
            text: None,
            date: None,
        };
        let sender = t.resolve_sender(&msg).await.unwrap();
        assert_eq!(sender.display_name, "Ada");
        assert_eq!(t.permalink(&msg).await.unwrap().as_deref(), Some("https://t.me/news/3"));
    }

    #[tokio::test]
    async fn test_resolution_without_entities_file_fails_softly() {
        let dir = TempDir::new().unwrap();
        let t = transport(&dir);
        assert!(matches!(
            t.resolve_entity(-100123).await,
            Err(TransportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_yields_only_new_messages() {
        let dir = TempDir::new().unwrap();
        let path = write_export(dir.path(), -100123, &[1, 2]);
        write_export(dir.path(), -100999, &[1]);
        let t = transport(&dir);

        let mut stream = t.subscribe_new_messages(&[-100123]).await.unwrap();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, r#"{{"id": 3, "text": "fresh"}}"#).unwrap();
        write_export(dir.path(), -100999, &[1, 2]);

        let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended");
        assert_eq!(next.id, 3);
        assert_eq!(next.chat_id, -100123);
        assert_eq!(next.text.as_deref(), Some("fresh"));
    }
}

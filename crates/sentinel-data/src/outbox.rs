//! A [`Notifier`] that appends every delivery to a JSONL outbox file.
//!
//! Whatever relays messages to operators tails this file; each line is
//! `{"recipient", "text", "links", "sent_at"}`.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentinel_core::error::TransportError;
use sentinel_core::formatting::ActionLink;
use sentinel_core::models::OperatorId;
use sentinel_core::ports::Notifier;
use serde::{Deserialize, Serialize};

/// One delivered notification as written to the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub recipient: OperatorId,
    pub text: String,
    #[serde(default)]
    pub links: Vec<ActionLink>,
    pub sent_at: DateTime<Utc>,
}

/// Append-only JSONL notifier.
#[derive(Debug)]
pub struct OutboxNotifier {
    path: PathBuf,
    // Serialises appends so concurrent deliveries never interleave lines.
    write_lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every entry in the outbox, skipping malformed lines.
    pub fn read_entries(&self) -> std::io::Result<Vec<OutboxEntry>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    fn append(&self, entry: &OutboxEntry) -> Result<(), TransportError> {
        let mut line =
            serde_json::to_string(entry).map_err(|e| TransportError::Other(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(
        &self,
        recipient: OperatorId,
        text: &str,
        links: &[ActionLink],
    ) -> Result<(), TransportError> {
        let entry = OutboxEntry {
            recipient,
            text: text.to_string(),
            links: links.to_vec(),
            sent_at: Utc::now(),
        };
        self.append(&entry)?;
        tracing::debug!(recipient, path = %self.path.display(), "notification written to outbox");
        Ok(())
    }
}

//! In-memory transport and notifier doubles for runtime tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sentinel_core::error::TransportError;
use sentinel_core::formatting::ActionLink;
use sentinel_core::models::{
    EntityInfo, HistoryCursor, OperatorId, RawMessage, SenderInfo, SourceId, StoreSnapshot,
};
use sentinel_core::ports::{ChatTransport, MessageStream, Notifier};
use sentinel_data::persistence::MemoryPersistence;
use sentinel_data::store::SourceStore;
use tokio::sync::mpsc;

use crate::context::WatchContext;

pub(crate) fn message(chat_id: SourceId, id: i64, text: &str) -> RawMessage {
    RawMessage {
        id,
        chat_id,
        sender_id: Some(555),
        text: Some(text.to_string()),
        date: None,
    }
}

/// One recorded `fetch_history_page` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchCall {
    pub source_id: SourceId,
    pub cursor: HistoryCursor,
    pub requested: usize,
    pub returned: Vec<i64>,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    history: Mutex<HashMap<SourceId, Vec<RawMessage>>>,
    entities: Mutex<HashMap<SourceId, EntityInfo>>,
    senders: Mutex<HashMap<i64, SenderInfo>>,
    fail_fetch_from: Mutex<Option<usize>>,
    fetches: Mutex<Vec<FetchCall>>,
    subscriptions: Mutex<Vec<Vec<SourceId>>>,
    live: Mutex<Option<mpsc::UnboundedSender<RawMessage>>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// `messages` are given oldest first.
    pub fn with_history(self, source_id: SourceId, messages: Vec<RawMessage>) -> Self {
        self.history.lock().insert(source_id, messages);
        self
    }

    pub fn with_entity(self, id: SourceId, title: &str, handle: Option<&str>) -> Self {
        self.entities.lock().insert(
            id,
            EntityInfo {
                title: title.to_string(),
                handle: handle.map(str::to_string),
            },
        );
        self
    }

    pub fn with_sender(self, id: i64, name: &str, handle: Option<&str>) -> Self {
        self.senders.lock().insert(
            id,
            SenderInfo {
                id,
                display_name: name.to_string(),
                handle: handle.map(str::to_string),
            },
        );
        self
    }

    /// Make the `n`-th fetch (0-based) and every later one fail.
    pub fn fail_fetches_from(self, n: usize) -> Self {
        *self.fail_fetch_from.lock() = Some(n);
        self
    }

    pub fn fetches(&self) -> Vec<FetchCall> {
        self.fetches.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<Vec<SourceId>> {
        self.subscriptions.lock().clone()
    }

    /// Total number of transport calls of any kind.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Deliver `message` on the most recent live subscription.
    pub fn push_live(&self, message: RawMessage) -> bool {
        match self.live.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn subscribe_new_messages(
        &self,
        source_ids: &[SourceId],
    ) -> Result<MessageStream, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().push(source_ids.to_vec());
        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock() = Some(tx);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|m| (m, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn fetch_history_page(
        &self,
        source_id: SourceId,
        cursor: HistoryCursor,
        page_size: usize,
    ) -> Result<Vec<RawMessage>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let index = self.fetches.lock().len();
        if matches!(*self.fail_fetch_from.lock(), Some(n) if index >= n) {
            self.fetches.lock().push(FetchCall {
                source_id,
                cursor,
                requested: page_size,
                returned: Vec::new(),
            });
            return Err(TransportError::RateLimited {
                retry_after_secs: 30,
            });
        }

        let mut page = self
            .history
            .lock()
            .get(&source_id)
            .cloned()
            .unwrap_or_default();
        if let HistoryCursor::Before(before) = cursor {
            page.retain(|m| m.id < before);
        }
        page.sort_by(|a, b| b.id.cmp(&a.id));
        page.truncate(page_size);

        self.fetches.lock().push(FetchCall {
            source_id,
            cursor,
            requested: page_size,
            returned: page.iter().map(|m| m.id).collect(),
        });
        Ok(page)
    }

    async fn resolve_entity(&self, id: SourceId) -> Result<EntityInfo, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entities
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("chat {}", id)))
    }

    async fn resolve_sender(&self, message: &RawMessage) -> Result<SenderInfo, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        message
            .sender_id
            .and_then(|id| self.senders.lock().get(&id).cloned())
            .ok_or_else(|| TransportError::NotFound(format!("sender of {}", message.id)))
    }
}

/// One recorded delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Sent {
    pub recipient: OperatorId,
    pub text: String,
    pub links: Vec<ActionLink>,
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    failing: HashSet<OperatorId>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipients: &[OperatorId]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: recipients.iter().copied().collect(),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn recipients(&self) -> Vec<OperatorId> {
        self.sent.lock().iter().map(|s| s.recipient).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipient: OperatorId,
        text: &str,
        links: &[ActionLink],
    ) -> Result<(), TransportError> {
        if self.failing.contains(&recipient) {
            return Err(TransportError::Connection("peer unreachable".to_string()));
        }
        self.sent.lock().push(Sent {
            recipient,
            text: text.to_string(),
            links: links.to_vec(),
        });
        Ok(())
    }
}

/// A context over an in-memory store with `primary` as primary operator.
pub(crate) fn context(
    transport: Arc<FakeTransport>,
    notifier: Arc<RecordingNotifier>,
    primary: OperatorId,
) -> WatchContext {
    let persistence = MemoryPersistence::with_snapshot(StoreSnapshot::new(primary));
    let store = SourceStore::open(persistence, primary).expect("open store");
    WatchContext::new(Arc::new(store), transport, notifier)
}

//! Seams to the outside world: the chat transport messages are read from and
//! the notification transport operators are reached through.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransportError;
use crate::formatting::{message_link, ActionLink};
use crate::models::{EntityInfo, HistoryCursor, OperatorId, RawMessage, SenderInfo, SourceId};

/// Stream of new messages from a live subscription. Dropping it ends the
/// subscription.
pub type MessageStream = BoxStream<'static, RawMessage>;

/// Read access to the chat network.
///
/// Implementations must tolerate concurrent calls; the runtime issues page
/// fetches and lookups from several tasks at once.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Subscribe to new messages posted in `source_ids`.
    ///
    /// Transports that cannot scope a subscription may deliver messages from
    /// other chats; the live monitor filters them out.
    async fn subscribe_new_messages(
        &self,
        source_ids: &[SourceId],
    ) -> Result<MessageStream, TransportError>;

    /// Fetch up to `page_size` messages older than `cursor`, newest first.
    async fn fetch_history_page(
        &self,
        source_id: SourceId,
        cursor: HistoryCursor,
        page_size: usize,
    ) -> Result<Vec<RawMessage>, TransportError>;

    /// Look up the title and public handle of a chat.
    async fn resolve_entity(&self, id: SourceId) -> Result<EntityInfo, TransportError>;

    /// Look up who wrote `message`.
    async fn resolve_sender(&self, message: &RawMessage) -> Result<SenderInfo, TransportError>;

    /// Permalink to `message`, derived from its chat's public handle when it
    /// has one and from the native chat id otherwise.
    async fn permalink(&self, message: &RawMessage) -> Result<Option<String>, TransportError> {
        let chat = self.resolve_entity(message.chat_id).await?;
        Ok(Some(message_link(
            message.chat_id,
            chat.handle.as_deref(),
            message.id,
        )))
    }
}

/// Delivery of rendered notifications to a single operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: OperatorId,
        text: &str,
        links: &[ActionLink],
    ) -> Result<(), TransportError>;
}

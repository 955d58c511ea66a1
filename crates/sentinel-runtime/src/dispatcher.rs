//! Fan-out of a rendered notification to its recipients.

use std::sync::Arc;

use sentinel_core::formatting::Notification;
use sentinel_core::models::OperatorId;
use sentinel_core::ports::Notifier;

/// Per-call delivery tally. Callers are free to ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

/// Best-effort, at-most-once delivery to each recipient.
#[derive(Clone)]
pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Deliver `notification` to every recipient in order. A failed delivery
    /// is logged and never stops delivery to the remaining recipients.
    pub async fn dispatch(
        &self,
        notification: &Notification,
        recipients: &[OperatorId],
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for &recipient in recipients {
            match self
                .notifier
                .send(recipient, &notification.text, &notification.links)
                .await
            {
                Ok(()) => {
                    summary.delivered += 1;
                    tracing::debug!(recipient, "notification delivered");
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(recipient, error = %e, "failed to deliver notification");
                }
            }
        }
        summary
    }
}

//! The shared handles every runtime component is constructed with.

use std::sync::Arc;

use sentinel_core::ports::{ChatTransport, Notifier};
use sentinel_data::store::SourceStore;

use crate::dispatcher::Dispatcher;

/// Store, chat transport and dispatcher, passed explicitly to the live
/// monitor and to every backfill. Cloning is cheap.
#[derive(Clone)]
pub struct WatchContext {
    pub store: Arc<SourceStore>,
    pub transport: Arc<dyn ChatTransport>,
    pub dispatcher: Dispatcher,
}

impl WatchContext {
    pub fn new(
        store: Arc<SourceStore>,
        transport: Arc<dyn ChatTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            transport,
            dispatcher: Dispatcher::new(notifier),
        }
    }
}

impl std::fmt::Debug for WatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchContext")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

//! The shared registry of sources, keywords, run flags and operators.
//!
//! Every mutation runs against a draft copy of the aggregate under one lock,
//! is flushed to the [`Persistence`] backend, and only then becomes visible.
//! A failed flush therefore leaves both the in-memory and the on-disk view
//! at the last committed state.

use parking_lot::Mutex;
use sentinel_core::error::{Result, SentinelError};
use sentinel_core::models::{
    OperatorId, OperatorSet, RunState, Source, SourceId, SourceKind, StoreSnapshot,
};

use crate::persistence::Persistence;

/// Concurrency-safe, durable store shared by the live monitor and backfills.
pub struct SourceStore {
    state: Mutex<StoreSnapshot>,
    persistence: Box<dyn Persistence>,
}

impl std::fmt::Debug for SourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStore")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl SourceStore {
    // ── Construction ──────────────────────────────────────────────────────────

    /// Load the aggregate from `persistence`, or create and flush a fresh one.
    ///
    /// `primary` becomes the primary operator; a different previously
    /// persisted primary is kept on as a regular operator.
    pub fn open(persistence: impl Persistence + 'static, primary: OperatorId) -> Result<Self> {
        let loaded = persistence.load()?;
        let fresh = loaded.is_none();
        let mut snapshot = loaded.unwrap_or_else(|| StoreSnapshot::new(primary));
        let promoted = snapshot.operators.primary() != primary;
        snapshot.operators.promote(primary);

        if fresh || promoted {
            persistence.save(&snapshot)?;
        }
        if fresh {
            tracing::info!("created new store");
        } else {
            tracing::info!(
                sources = snapshot.sources.len(),
                keywords = snapshot.keywords.len(),
                "store loaded"
            );
        }

        Ok(Self {
            state: Mutex::new(snapshot),
            persistence: Box::new(persistence),
        })
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// A consistent copy of the whole aggregate.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().clone()
    }

    pub fn source(&self, id: SourceId) -> Option<Source> {
        self.state.lock().sources.get(&id).cloned()
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.state.lock().sources.keys().copied().collect()
    }

    pub fn is_backfilled(&self, id: SourceId) -> bool {
        self.state
            .lock()
            .sources
            .get(&id)
            .map(|s| s.backfilled)
            .unwrap_or(false)
    }

    pub fn keywords(&self) -> Vec<String> {
        self.state.lock().keywords.clone()
    }

    pub fn run_state(&self) -> RunState {
        self.state.lock().run_state
    }

    pub fn operators(&self) -> OperatorSet {
        self.state.lock().operators.clone()
    }

    pub fn is_operator(&self, id: OperatorId) -> bool {
        self.state.lock().operators.contains(id)
    }

    // ── Sources ───────────────────────────────────────────────────────────────

    /// Register `source`. Returns `false`, changing nothing, when the id is
    /// already registered.
    pub fn add_source(&self, source: Source) -> Result<bool> {
        if source.kind == SourceKind::Discussion && source.parent_id.is_none() {
            tracing::debug!(source_id = source.id, "discussion registered without parent");
        }
        let id = source.id;
        let added = self.update(|s| {
            if s.sources.contains_key(&id) {
                return Ok(false);
            }
            s.sources.insert(id, source);
            Ok(true)
        })?;
        if added {
            tracing::info!(source_id = id, "source added");
        }
        Ok(added)
    }

    pub fn remove_source(&self, id: SourceId) -> Result<bool> {
        let removed = self.update(|s| Ok(s.sources.remove(&id).is_some()))?;
        if removed {
            tracing::info!(source_id = id, "source removed");
        }
        Ok(removed)
    }

    /// Set the `backfilled` flag. Returns `false` when the source is gone
    /// (for example removed while its backfill was running).
    pub fn mark_backfilled(&self, id: SourceId) -> Result<bool> {
        self.update(|s| match s.sources.get_mut(&id) {
            Some(source) => {
                source.backfilled = true;
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Clear the `backfilled` flag so the history can be scanned again.
    /// Returns how many of `ids` were registered.
    pub fn reset_backfilled(&self, ids: &[SourceId]) -> Result<usize> {
        self.update(|s| {
            let mut count = 0;
            for id in ids {
                if let Some(source) = s.sources.get_mut(id) {
                    source.backfilled = false;
                    count += 1;
                }
            }
            Ok(count)
        })
    }

    // ── Keywords ──────────────────────────────────────────────────────────────

    /// Append a keyword. Returns `false` when an equal keyword, ignoring
    /// case, is already present.
    pub fn add_keyword(&self, keyword: &str) -> Result<bool> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(SentinelError::InvalidKeyword(keyword.to_string()));
        }
        let lowered = keyword.to_lowercase();
        self.update(|s| {
            if s.keywords.iter().any(|k| k.to_lowercase() == lowered) {
                return Ok(false);
            }
            s.keywords.push(keyword.to_string());
            Ok(true)
        })
    }

    /// Remove the keyword at `index` in iteration order.
    pub fn remove_keyword(&self, index: usize) -> Result<Option<String>> {
        self.update(|s| {
            if index < s.keywords.len() {
                Ok(Some(s.keywords.remove(index)))
            } else {
                Ok(None)
            }
        })
    }

    // ── Run state ─────────────────────────────────────────────────────────────

    pub fn set_running(&self, running: bool) -> Result<()> {
        self.update(|s| {
            s.run_state.is_running = running;
            Ok(())
        })
    }

    pub fn set_notifications(&self, enabled: bool) -> Result<()> {
        self.update(|s| {
            s.run_state.notifications_enabled = enabled;
            Ok(())
        })
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    pub fn add_operator(&self, id: OperatorId) -> Result<bool> {
        self.update(|s| Ok(s.operators.add(id)))
    }

    /// Remove a non-primary operator. Removing the primary is an error.
    pub fn remove_operator(&self, id: OperatorId) -> Result<bool> {
        self.update(|s| s.operators.remove(id))
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Apply `op` to a draft, flush it if it changed anything, then publish.
    fn update<T>(&self, op: impl FnOnce(&mut StoreSnapshot) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let mut draft = state.clone();
        let out = op(&mut draft)?;
        if draft != *state {
            if let Err(e) = self.persistence.save(&draft) {
                tracing::error!(error = %e, "failed to flush store; change discarded");
                return Err(e);
            }
            *state = draft;
        }
        Ok(out)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

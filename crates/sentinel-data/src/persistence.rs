//! Durable storage of the [`StoreSnapshot`] aggregate.
//!
//! The store always rewrites the whole aggregate, so a backend only needs
//! whole-document `load` and `save`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sentinel_core::error::{Result, SentinelError};
use sentinel_core::models::StoreSnapshot;

/// Whole-aggregate persistence backend.
pub trait Persistence: Send + Sync {
    /// Load the last saved aggregate, or `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<StoreSnapshot>>;

    /// Durably replace the saved aggregate.
    fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;
}

// ── JsonFilePersistence ───────────────────────────────────────────────────────

/// Pretty-printed JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_error(&self, source: std::io::Error) -> SentinelError {
        SentinelError::FileAccess {
            path: self.path.clone(),
            source,
        }
    }
}

impl Persistence for JsonFilePersistence {
    /// A missing file means a fresh store. A file that exists but cannot be
    /// parsed is an error: starting empty would overwrite every registration.
    fn load(&self) -> Result<Option<StoreSnapshot>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.file_error(e)),
        };
        let snapshot = serde_json::from_str(&content)?;
        tracing::debug!(path = %self.path.display(), "store loaded");
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.file_error(e))?;
        }

        let json = serde_json::to_string_pretty(snapshot)?;

        // Write and sync a temp file, then rename it over the old one.
        let tmp = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp).map_err(|e| self.file_error(e))?;
        file.write_all(json.as_bytes()).map_err(|e| self.file_error(e))?;
        file.sync_all().map_err(|e| self.file_error(e))?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(|e| self.file_error(e))?;

        Ok(())
    }
}

// ── MemoryPersistence ─────────────────────────────────────────────────────────

/// In-process backend; keeps the last saved aggregate and counts saves.
///
/// Saves can be made to fail with [`MemoryPersistence::fail_saves`].
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    saved: Mutex<Option<StoreSnapshot>>,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-saved aggregate.
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            saved: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    pub fn fail_saves(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Option<StoreSnapshot> {
        self.saved.lock().clone()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self) -> Result<Option<StoreSnapshot>> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SentinelError::Persistence("save rejected".to_string()));
        }
        *self.saved.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<P: Persistence + ?Sized> Persistence for std::sync::Arc<P> {
    fn load(&self) -> Result<Option<StoreSnapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        (**self).save(snapshot)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

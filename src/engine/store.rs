use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use chrono::Local;
use crate::engine::root::{self, DATABASE_DIR, HISTORY_DIR};
use crate::engine::{BlobStore, HistoryArchiver, Persistence, WriteLock};
use crate::{
    BlobIngestor, Document, DocumentReader, DocumentWriter, Error, Result, SaveReceipt, SnapshotInfo,
    StoreConfig, StoreInspector, StoreStatus, UploadRecord,
};
use log::{error, info};

pub const RESTORE_LABEL: &str = "RESTORE";

/// The embedded engine: one storage root, one document, one write lock.
///
/// All filesystem work runs on tokio's blocking pool. Cloning is cheap and clones
/// share the same lock and blob counter.
#[derive(Clone)]
pub struct DiskStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    root: PathBuf,
    persistence: Persistence,
    lock: WriteLock,
    history: HistoryArchiver,
    blobs: BlobStore,
}

impl DiskStore {
    /// Resolves the storage root from `config`, provisions it and opens the store.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let root = root::resolve_root(config);
        Self::with_root(root, config)
    }

    /// Opens the store at an explicit root, skipping mount resolution.
    pub fn with_root<P: AsRef<Path>>(root: P, config: &StoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        root::provision(&root)?;

        let db_dir = root.join(DATABASE_DIR);
        let inner = StoreInner {
            persistence: Persistence::new(&db_dir)?,
            lock: WriteLock::new(&db_dir, config.lock_stale_after),
            history: HistoryArchiver::new(root.join(HISTORY_DIR), config.history_keep),
            blobs: BlobStore::new(&root),
            root,
        };
        info!("Storage root ready at {}", inner.root.display());
        Ok(Self { inner: Arc::new(inner) })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn write_lock(&self) -> &WriteLock {
        &self.inner.lock
    }

    /// Clears an abandoned write lock. Returns whether one was present.
    pub fn force_unlock(&self) -> Result<bool> {
        let removed = self.inner.lock.force_release()?;
        if removed {
            log::warn!("Write lock {:?} cleared by operator", self.inner.lock.path());
        }
        Ok(removed)
    }

    /// Saves a history snapshot back as the current document.
    pub async fn restore(&self, day: &str, file_name: &str, actor: &str) -> Result<SaveReceipt> {
        let (day, file_name, actor) = (day.to_string(), file_name.to_string(), actor.to_string());
        self.run_blocking(move |inner| {
            let doc = inner.history.read(&day, &file_name)?;
            info!("Restoring snapshot {}/{}", day, file_name);
            inner.save(&doc, RESTORE_LABEL, &actor)
        })
        .await
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&StoreInner) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| Error::Internal(format!("storage task failed: {}", e)))?
    }
}

impl StoreInner {
    fn save(&self, doc: &Document, label: &str, actor: &str) -> Result<SaveReceipt> {
        let bytes = serde_json::to_vec_pretty(doc)?;

        let _lease = self.lock.acquire()?;
        self.persistence.write_twin(&bytes)?;

        if let Err(e) = self.history.archive(&bytes, label, actor) {
            error!("Saved, but history snapshot failed: {}", e);
        }

        Ok(SaveReceipt { time: Local::now() })
    }
}

#[async_trait]
impl DocumentReader for DiskStore {
    async fn load(&self) -> Result<Document> {
        self.run_blocking(|inner| Ok(inner.persistence.load(&inner.lock))).await
    }
}

#[async_trait]
impl DocumentWriter for DiskStore {
    async fn save(&self, doc: Document, label: &str, actor: &str) -> Result<SaveReceipt> {
        let (label, actor) = (label.to_string(), actor.to_string());
        self.run_blocking(move |inner| inner.save(&doc, &label, &actor)).await
    }
}

#[async_trait]
impl BlobIngestor for DiskStore {
    async fn ingest(&self, bytes: Vec<u8>, original_name: &str, category: &str) -> Result<UploadRecord> {
        let (original_name, category) = (original_name.to_string(), category.to_string());
        self.run_blocking(move |inner| inner.blobs.ingest(&bytes, &original_name, &category))
            .await
    }
}

#[async_trait]
impl StoreInspector for DiskStore {
    async fn status(&self) -> Result<StoreStatus> {
        Ok(StoreStatus {
            root: self.inner.root.clone(),
            lock_held: self.inner.lock.is_held(),
        })
    }

    async fn history(&self) -> Result<Vec<SnapshotInfo>> {
        self.run_blocking(|inner| inner.history.list()).await
    }
}

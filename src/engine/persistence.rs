use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::engine::lock::WriteLock;
use crate::{Document, Error, Result};
use log::{error, warn};
use serde_json::json;
use tempfile::NamedTempFile;

pub const MASTER_FILE: &str = "master_data.json";
pub const BACKUP_FILE: &str = "backup.json";

/// Collections present in a freshly initialised document.
pub const EMPTY_SCHEMA_KEYS: &[&str] = &[
    "users",
    "statements",
    "guq",
    "notifications",
    "attendanceRecords",
    "decrees",
    "carriers",
];

/// The document handed out when neither record is readable.
pub fn empty_document() -> Document {
    let mut doc = serde_json::Map::new();
    for key in EMPTY_SCHEMA_KEYS {
        doc.insert((*key).to_string(), json!([]));
    }
    Document::Object(doc)
}

/// Handles disk I/O for the master and backup records.
///
/// Both records are written with a "write-then-rename" strategy: the bytes go to a
/// temporary file in the same directory which is then renamed over the target, so a
/// concurrent reader sees either the old or the new file, never a partial one.
pub struct Persistence {
    db_dir: PathBuf,
}

impl Persistence {
    /// Initializes a new `Persistence` handler in the specified directory.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { db_dir: dir })
    }

    pub fn master_path(&self) -> PathBuf {
        self.db_dir.join(MASTER_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.db_dir.join(BACKUP_FILE)
    }

    /// Writes the same bytes to the master record and then to the backup.
    ///
    /// There is no rollback: if the backup write fails the master has already been
    /// replaced, and the error says which stage failed.
    pub fn write_twin(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.master_path(), bytes)
            .map_err(|source| Error::PartialWrite { stage: "master record", source })?;
        write_atomic(&self.backup_path(), bytes)
            .map_err(|source| Error::PartialWrite { stage: "backup record", source })?;
        Ok(())
    }

    /// Returns the current document. Never fails and never waits on a save.
    ///
    /// Order of preference: master, then backup (which is copied back over the
    /// master), then the empty schema (which is written to both records). Repairs
    /// only happen while `lock` is free; a load that races a save serves what it
    /// read and leaves the records to the save.
    pub fn load(&self, lock: &WriteLock) -> Document {
        let master_path = self.master_path();
        match read_record(&master_path) {
            Ok(doc) => return doc,
            Err(reason) => warn!("Master record {:?} unusable: {}", master_path, reason),
        }

        let lease = match lock.try_acquire() {
            Ok(lease) => lease,
            Err(e) => {
                error!("Could not take the write lock for repair: {}", e);
                None
            }
        };
        match &lease {
            // A save may have finished between the first read and the lock.
            Some(_) => {
                if let Ok(doc) = read_record(&master_path) {
                    return doc;
                }
            }
            None => warn!("Save in progress, serving without repairing {:?}", master_path),
        }
        let repair = lease.is_some();

        let backup_path = self.backup_path();
        match read_record(&backup_path) {
            Ok(doc) => {
                warn!("Recovered document from backup {:?}", backup_path);
                if repair {
                    match serde_json::to_vec_pretty(&doc) {
                        Ok(bytes) => {
                            if let Err(e) = write_atomic(&master_path, &bytes) {
                                error!("Could not repair master record from backup: {}", e);
                            }
                        }
                        Err(e) => error!("Could not re-encode backup document: {}", e),
                    }
                }
                return doc;
            }
            Err(reason) => warn!("Backup record {:?} unusable: {}", backup_path, reason),
        }

        error!("Master and backup both unreadable, reinitialising with the empty schema");
        let doc = empty_document();
        if repair {
            match serde_json::to_vec_pretty(&doc) {
                Ok(bytes) => {
                    if let Err(e) = self.write_twin(&bytes) {
                        error!("Could not persist the empty schema: {}", e);
                    }
                }
                Err(e) => error!("Could not encode the empty schema: {}", e),
            }
        }
        doc
    }
}

/// Writes `bytes` to `path` through a sibling temp file and an atomic rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_record(path: &Path) -> std::result::Result<Document, String> {
    let content = fs::read(path).map_err(|e| e.to_string())?;
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Err("empty file".to_string());
    }
    serde_json::from_slice(&content).map_err(|e| e.to_string())
}

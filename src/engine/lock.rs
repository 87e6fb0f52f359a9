use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use chrono::{DateTime, Local};
use crate::{Error, Result};
use log::{error, warn};

pub const LOCK_FILE: &str = ".write.lock";

/// Sentinel-file lock that serializes saves.
///
/// The marker is created with `create_new`, so two contenders can never both win,
/// whether they are threads of this process or separate processes. Its content is
/// the acquisition time in RFC 3339.
pub struct WriteLock {
    path: PathBuf,
    stale_after: Option<Duration>,
}

/// Held while a save runs. Dropping it removes the marker.
pub struct LockLease {
    path: PathBuf,
    file: File,
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            error!("Failed to release write lock {:?}: {}", self.path, e);
        }
    }
}

impl WriteLock {
    pub fn new<P: AsRef<Path>>(db_dir: P, stale_after: Option<Duration>) -> Self {
        Self {
            path: db_dir.as_ref().join(LOCK_FILE),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Takes the lock or fails with [`Error::Busy`].
    ///
    /// With a staleness threshold configured, a marker older than the threshold is
    /// removed and acquisition is attempted once more.
    pub fn acquire(&self) -> Result<LockLease> {
        match self.try_acquire()? {
            Some(lease) => Ok(lease),
            None if self.is_stale() => {
                warn!("Reclaiming stale write lock {:?}", self.path);
                match fs::remove_file(&self.path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::Io(e)),
                }
                self.try_acquire()?.ok_or(Error::Busy)
            }
            None => {
                warn!("Save rejected: write lock {:?} is held", self.path);
                Err(Error::Busy)
            }
        }
    }

    /// Removes the marker regardless of who holds it. Returns whether one existed.
    pub fn force_release(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Takes the lock if it is free. `Ok(None)` means someone else holds it.
    ///
    /// Unlike [`acquire`](Self::acquire) this neither reclaims stale markers nor
    /// logs contention.
    pub fn try_acquire(&self) -> Result<Option<LockLease>> {
        let file = match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        // Built before the stamp is written so a failed write still removes the marker.
        let mut lease = LockLease {
            path: self.path.clone(),
            file,
        };
        lease.file.write_all(Local::now().to_rfc3339().as_bytes())?;
        Ok(Some(lease))
    }

    fn is_stale(&self) -> bool {
        let Some(threshold) = self.stale_after else {
            return false;
        };
        match self.acquired_at() {
            Some(at) => SystemTime::now()
                .duration_since(at)
                .map(|age| age > threshold)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Timestamp written into the marker, or its mtime if the content is unreadable.
    fn acquired_at(&self) -> Option<SystemTime> {
        let stamped = fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(SystemTime::from);
        stamped.or_else(|| fs::metadata(&self.path).and_then(|m| m.modified()).ok())
    }
}

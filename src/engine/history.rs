use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use chrono::{DateTime, Local};
use crate::engine::root::HISTORY_DIR;
use crate::{Document, Error, Result, SnapshotInfo, UNKNOWN_ACTOR};
use log::warn;

/// Writes dated snapshots of every saved document and bounds them per day.
///
/// Layout: `History/<YYYY-MM-DD>/<YYYY-MM-DD>_<HH-MM-SS>_<label>_by_<actor>.json`.
/// When two snapshots would share a name (same second, label and actor) the later
/// one gets a `_2`, `_3`, ... suffix, and retention treats higher suffixes as newer.
pub struct HistoryArchiver {
    dir: PathBuf,
    keep: usize,
}

impl HistoryArchiver {
    pub fn new<P: AsRef<Path>>(history_dir: P, keep: usize) -> Self {
        Self {
            dir: history_dir.as_ref().to_path_buf(),
            keep: keep.max(1),
        }
    }

    /// Archives `bytes` under today's directory, then prunes that directory.
    pub fn archive(&self, bytes: &[u8], label: &str, actor: &str) -> Result<PathBuf> {
        self.archive_at(Local::now(), bytes, label, actor)
    }

    fn archive_at(&self, now: DateTime<Local>, bytes: &[u8], label: &str, actor: &str) -> Result<PathBuf> {
        let day = now.format("%Y-%m-%d").to_string();
        let day_dir = self.dir.join(&day);
        fs::create_dir_all(&day_dir)?;

        let stem = format!(
            "{}_{}_{}_by_{}",
            day,
            now.format("%H-%M-%S"),
            sanitize_tag(label, "SAVE"),
            sanitize_tag(actor, UNKNOWN_ACTOR),
        );

        let mut attempt = 1u32;
        let path = loop {
            let name = if attempt == 1 {
                format!("{}.json", stem)
            } else {
                format!("{}_{}.json", stem, attempt)
            };
            let path = day_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(bytes)?;
                    break path;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(Error::Io(e)),
            }
        };

        let removed = self.prune(&day_dir)?;
        if removed > 0 {
            log::debug!("Pruned {} snapshot(s) from {:?}", removed, day_dir);
        }
        Ok(path)
    }

    /// Deletes all but the `keep` most recently modified snapshots in `day_dir`.
    fn prune(&self, day_dir: &Path) -> Result<usize> {
        let mut snapshots = snapshot_files(day_dir)?;
        newest_first(&mut snapshots);

        let mut removed = 0;
        for (path, _) in snapshots.into_iter().skip(self.keep) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not prune snapshot {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }

    /// Every retained snapshot, newest day first and newest file first within a day.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>> {
        let mut days: Vec<String> = match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        days.sort_by(|a, b| b.cmp(a));

        let mut out = Vec::new();
        for day in days {
            let mut files = snapshot_files(&self.dir.join(&day))?;
            newest_first(&mut files);
            for (path, _) in files {
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                    continue;
                };
                let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                out.push(SnapshotInfo {
                    path: format!("{}/{}/{}", HISTORY_DIR, day, file_name),
                    day: day.clone(),
                    file_name,
                    size,
                });
            }
        }
        Ok(out)
    }

    /// Parses one snapshot back into a document.
    pub fn read(&self, day: &str, file_name: &str) -> Result<Document> {
        let not_found = || Error::SnapshotNotFound(format!("{}/{}", day, file_name));
        if !is_plain_name(day) || !is_plain_name(file_name) {
            return Err(not_found());
        }
        let content = match fs::read(self.dir.join(day).join(file_name)) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(Error::Io(e)),
        };
        Ok(serde_json::from_slice(&content)?)
    }
}

/// Keeps ASCII letters and digits only; `fallback` if nothing survives.
pub fn sanitize_tag(raw: &str, fallback: &str) -> String {
    let clean: String = raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if clean.is_empty() {
        fallback.to_string()
    } else {
        clean
    }
}

fn is_plain_name(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

/// Orders by mtime, newest first. Equal mtimes fall back to the name, with the
/// same-second `_N` suffix compared as a number so `_10` ranks above `_9`.
fn newest_first(files: &mut [(PathBuf, SystemTime)]) {
    files.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| collision_key(&b.0).cmp(&collision_key(&a.0)))
    });
}

/// Splits `<...>_by_<actor>[_N].json` into the unsuffixed stem and `N` (1 if absent).
///
/// Actors are sanitised to letters and digits, so any `_` after `_by_` starts the suffix.
fn collision_key(path: &Path) -> (String, u32) {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    if let Some((head, tail)) = stem.rsplit_once("_by_") {
        if let Some((actor, n)) = tail.split_once('_') {
            if let Ok(n) = n.parse::<u32>() {
                return (format!("{}_by_{}", head, actor), n);
            }
        }
    }
    (stem.to_string(), 1)
}

fn snapshot_files(day_dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(day_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        files.push((path, modified));
    }
    Ok(files)
}

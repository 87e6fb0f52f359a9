use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use chrono::Local;
use uuid::Uuid;
use crate::engine::root::DEFAULT_CATEGORY;
use crate::{Error, Result, UploadRecord};
use log::{info, warn};

/// Category-addressed store for uploaded files.
///
/// Files land at `<root>/<category>/<millis>_<sanitized name>` and are never
/// rewritten. The millisecond prefix is strictly increasing within the process and
/// files are opened with `create_new`, so identical names never collide.
pub struct BlobStore {
    root: PathBuf,
    last_stamp: AtomicI64,
}

impl BlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            last_stamp: AtomicI64::new(0),
        }
    }

    pub fn ingest(&self, bytes: &[u8], original_name: &str, category: &str) -> Result<UploadRecord> {
        let category = normalize_category(category)?;
        let dir = self.root.join(&category);
        fs::create_dir_all(&dir)?;

        let safe_name = sanitize_file_name(original_name);
        let (file_name, file) = loop {
            let candidate = format!("{}_{}", self.next_stamp(), safe_name);
            match OpenOptions::new().write(true).create_new(true).open(dir.join(&candidate)) {
                Ok(file) => break (candidate, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        };
        fill_or_discard(&dir.join(&file_name), file, bytes)?;

        let path = format!("{}/{}", category, file_name);
        info!("Stored upload {} ({} bytes)", path, bytes.len());

        Ok(UploadRecord {
            id: Uuid::new_v4().to_string(),
            file_name,
            original_name: original_name.to_string(),
            category,
            path,
            upload_date: Local::now(),
        })
    }

    fn next_stamp(&self) -> i64 {
        let now = Local::now().timestamp_millis();
        let prev = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(prev + 1)
    }
}

/// Writes `bytes` into the freshly created file at `path`, removing it on failure.
fn fill_or_discard<W: Write>(path: &Path, mut out: W, bytes: &[u8]) -> Result<()> {
    let written = out.write_all(bytes).and_then(|()| out.flush());
    drop(out);
    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(path) {
            warn!("Could not remove partial upload {:?}: {}", path, cleanup);
        }
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Turns a caller-supplied category into a relative `a/b/c` path.
///
/// Empty segments are dropped and an empty category becomes [`DEFAULT_CATEGORY`].
/// Anything that could climb out of the root (`..`, `.`, absolute paths, drive
/// prefixes) is rejected.
pub fn normalize_category(raw: &str) -> Result<String> {
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        if segment.is_empty() {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => segments.push(segment),
            _ => return Err(Error::InvalidCategory(raw.to_string())),
        }
    }
    if segments.is_empty() {
        return Ok(DEFAULT_CATEGORY.to_string());
    }
    Ok(segments.join("/"))
}

/// Replaces everything outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(raw: &str) -> String {
    let clean: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    if clean.is_empty() {
        "file".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("b\u{1ea3}ng l\u{1b0}\u{1a1}ng 1.xlsx"), "b_ng_l__ng_1.xlsx");
        assert_eq!(sanitize_file_name("a/b\\c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_file_name("report-2024_v2.xlsx"), "report-2024_v2.xlsx");
        assert_eq!(sanitize_file_name(""), "file");
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("LIBRARY/Policies").unwrap(), "LIBRARY/Policies");
        assert_eq!(normalize_category("/PAYROLL//2024/").unwrap(), "PAYROLL/2024");
        assert_eq!(normalize_category("").unwrap(), DEFAULT_CATEGORY);
        assert!(matches!(normalize_category("LIBRARY/../.."), Err(Error::InvalidCategory(_))));
        assert!(matches!(normalize_category("./GUQ"), Err(Error::InvalidCategory(_))));
    }

    #[test]
    fn test_identical_names_get_distinct_files() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let a = store.ingest(b"first", "scan.pdf", "GUQ").unwrap();
        let b = store.ingest(b"second", "scan.pdf", "GUQ").unwrap();

        assert_ne!(a.file_name, b.file_name);
        assert_ne!(a.id, b.id);
        assert_eq!(a.original_name, "scan.pdf");
        assert_eq!(a.path, format!("GUQ/{}", a.file_name));
        assert!(a.file_name.ends_with("_scan.pdf"));
        assert_eq!(fs::read(dir.path().join(&a.path)).unwrap(), b"first");
        assert_eq!(fs::read(dir.path().join(&b.path)).unwrap(), b"second");
    }

    #[test]
    fn test_nested_category_created_on_demand() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());

        let record = store.ingest(b"policy", "handbook.docx", "LIBRARY/Policies").unwrap();
        assert_eq!(record.category, "LIBRARY/Policies");
        assert!(dir.path().join("LIBRARY").join("Policies").is_dir());
        assert!(dir.path().join(&record.path).is_file());
    }

    #[test]
    fn test_traversal_rejected_without_writing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        let store = BlobStore::new(&root);

        let res = store.ingest(b"x", "evil.txt", "../outside");
        assert!(matches!(res, Err(Error::InvalidCategory(_))));
        assert!(!dir.path().join("outside").exists());
    }

    #[test]
    fn test_stamps_strictly_increase() {
        let dir = tempdir().unwrap();
        let store = BlobStore::new(dir.path());
        let first = store.next_stamp();
        let second = store.next_stamp();
        assert!(second > first);
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_leaves_no_partial_upload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1700000000000_scan.pdf");
        fs::write(&path, b"").unwrap();

        let res = fill_or_discard(&path, FullDisk, b"scan bytes");
        assert!(matches!(res, Err(Error::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_successful_write_keeps_upload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1700000000000_scan.pdf");
        let file = OpenOptions::new().write(true).create_new(true).open(&path).unwrap();

        fill_or_discard(&path, file, b"scan bytes").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"scan bytes");
    }
}

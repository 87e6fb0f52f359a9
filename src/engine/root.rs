use std::fs;
use std::path::{Path, PathBuf};
use crate::{Error, Result, StoreConfig};
use log::{info, warn};

pub const DATABASE_DIR: &str = "Database";
pub const HISTORY_DIR: &str = "History";
pub const DEFAULT_CATEGORY: &str = "UPLOADS";

/// Directories that must exist under every storage root.
pub const CATEGORY_DIRS: &[&str] = &[
    DATABASE_DIR,
    HISTORY_DIR,
    DEFAULT_CATEGORY,
    "GUQ",
    "REFUNDS",
    "PAYROLL",
    "LIBRARY",
];

const PROBE_FILE: &str = ".write_probe";

/// Picks the storage root for this process.
///
/// The mounted root (`preferred_mount/subfolder`) wins if the mount exists and a
/// create/delete probe succeeds there. Anything else falls back to `local_root`;
/// this never fails.
pub fn resolve_root(config: &StoreConfig) -> PathBuf {
    let candidate = config.mounted_root();
    match probe(&config.preferred_mount, &candidate) {
        Ok(()) => {
            info!("Using storage root on mount: {}", candidate.display());
            candidate
        }
        Err(e) => {
            warn!(
                "Mount root {} unusable ({}), falling back to {}",
                candidate.display(),
                e,
                config.local_root.display()
            );
            config.local_root.clone()
        }
    }
}

fn probe(mount: &Path, candidate: &Path) -> std::io::Result<()> {
    if !mount.is_dir() {
        return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "mount point absent"));
    }
    fs::create_dir_all(candidate)?;
    let probe_path = candidate.join(PROBE_FILE);
    fs::write(&probe_path, b"probe")?;
    fs::remove_file(&probe_path)?;
    Ok(())
}

/// Creates the fixed category directories under `root`. Safe to call repeatedly.
pub fn provision(root: &Path) -> Result<()> {
    for dir in CATEGORY_DIRS {
        let path = root.join(dir);
        fs::create_dir_all(&path)
            .map_err(|e| Error::Startup(format!("cannot create {}: {}", path.display(), e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_for(mount: &Path, local: &Path) -> StoreConfig {
        StoreConfig {
            preferred_mount: mount.to_path_buf(),
            local_root: local.to_path_buf(),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_prefers_writable_mount() {
        let mount = tempdir().unwrap();
        let local = tempdir().unwrap();
        let config = config_for(mount.path(), local.path());

        let root = resolve_root(&config);
        assert_eq!(root, mount.path().join("DocVault"));
        assert!(root.is_dir());
        assert!(!root.join(PROBE_FILE).exists());
    }

    #[test]
    fn test_falls_back_when_mount_absent() {
        let local = tempdir().unwrap();
        let config = config_for(&local.path().join("no-such-mount"), local.path());

        assert_eq!(resolve_root(&config), local.path());
        assert!(!local.path().join("no-such-mount").exists());
    }

    #[test]
    fn test_falls_back_when_mount_is_not_writable() {
        let mount = tempdir().unwrap();
        let local = tempdir().unwrap();
        fs::write(mount.path().join("DocVault"), b"a file, not a folder").unwrap();
        let config = config_for(mount.path(), local.path());

        assert_eq!(resolve_root(&config), local.path());
        assert_eq!(fs::read(mount.path().join("DocVault")).unwrap(), b"a file, not a folder");
    }

    #[test]
    fn test_provision_is_idempotent() {
        let dir = tempdir().unwrap();
        provision(dir.path()).unwrap();
        fs::write(dir.path().join("LIBRARY").join("keep.txt"), b"x").unwrap();
        provision(dir.path()).unwrap();

        for name in CATEGORY_DIRS {
            assert!(dir.path().join(name).is_dir(), "{} missing", name);
        }
        assert!(dir.path().join("LIBRARY").join("keep.txt").exists());
    }

    #[test]
    fn test_provision_fails_loudly_on_file_in_the_way() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::write(&root, b"not a directory").unwrap();

        assert!(matches!(provision(&root), Err(Error::Startup(_))));
    }
}

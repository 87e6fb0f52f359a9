use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the store, the daemon and the CLI.
///
/// Values come from [`Default`], then the `DOCVAULT_*` environment variables
/// (see [`StoreConfig::from_env`]), then command-line flags in the binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// External mount tried first for the storage root.
    pub preferred_mount: PathBuf,
    /// Folder created under the mount.
    pub subfolder: String,
    /// Fallback root, relative to the working directory.
    pub local_root: PathBuf,
    /// Snapshots kept per calendar day.
    pub history_keep: usize,
    /// Age after which a write lock is treated as abandoned. `None` never expires.
    pub lock_stale_after: Option<Duration>,
    pub port: u16,
    /// Body cap for `POST /api/save`. Uploads are not capped.
    pub save_body_limit: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            preferred_mount: PathBuf::from("/mnt/storage"),
            subfolder: "DocVault".to_string(),
            local_root: PathBuf::from("storage"),
            history_keep: 3,
            lock_stale_after: None,
            port: 3000,
            save_body_limit: 50 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    /// Defaults overlaid with whatever `DOCVAULT_*` variables are set.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(mount) = env::var("DOCVAULT_MOUNT") {
            config.preferred_mount = PathBuf::from(mount);
        }
        if let Ok(subfolder) = env::var("DOCVAULT_SUBFOLDER") {
            config.subfolder = subfolder;
        }
        if let Ok(local) = env::var("DOCVAULT_LOCAL_ROOT") {
            config.local_root = PathBuf::from(local);
        }
        if let Some(keep) = parse_var::<usize>("DOCVAULT_HISTORY_KEEP") {
            config.history_keep = keep;
        }
        if let Some(secs) = parse_var::<u64>("DOCVAULT_LOCK_STALE_SECS") {
            config.lock_stale_after = Some(Duration::from_secs(secs));
        }
        if let Some(port) = parse_var::<u16>("DOCVAULT_PORT") {
            config.port = port;
        }

        config
    }

    /// The mount-side root candidate: `preferred_mount/subfolder`.
    pub fn mounted_root(&self) -> PathBuf {
        self.preferred_mount.join(&self.subfolder)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.history_keep, 3);
        assert!(config.lock_stale_after.is_none());
        assert_eq!(config.mounted_root(), PathBuf::from("/mnt/storage/DocVault"));
    }
}

use std::env;
use std::sync::Arc;
use crate::engine::DiskStore;
use crate::sdk::Client;
use crate::{Result, StoreConfig, SyncStore};

/// Initializes a [`SyncStore`] based on the environment.
///
/// `new` automatically detects whether to talk to a running daemon or open the
/// storage root directly:
///
/// 1. If the `DOCVAULT_ADDR` environment variable is set and the daemon answers,
///    a remote [`Client`] is returned (**Remote Mode**).
/// 2. Otherwise a [`DiskStore`] is opened on the root resolved from `config`
///    (**Embedded Mode**).
///
/// # Examples
///
/// ```no_run
/// use docvault::{sdk, DocumentReader, StoreConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = sdk::new(&StoreConfig::from_env()).await?;
///     let doc = store.load().await?;
///     println!("{}", doc);
///     Ok(())
/// }
/// ```
pub async fn new(config: &StoreConfig) -> Result<Arc<dyn SyncStore>> {
    if let Ok(addr) = env::var("DOCVAULT_ADDR") {
        if !addr.is_empty() {
            match Client::connect(&addr).await {
                Ok(client) => return Ok(Arc::new(client)),
                Err(e) => log::warn!("DOCVAULT_ADDR={} unreachable ({}), using embedded mode", addr, e),
            }
        }
    }

    Ok(Arc::new(DiskStore::open(config)?))
}

use std::path::PathBuf;
use std::sync::Arc;
use docvault::engine::DiskStore;
use docvault::server::Router;
use docvault::StoreConfig;
use clap::Parser;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// External mount tried first for the storage root.
    #[arg(short, long)]
    mount: Option<PathBuf>,

    /// Fallback storage root.
    #[arg(short, long)]
    local_root: Option<PathBuf>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Snapshots kept per day.
    #[arg(long)]
    history_keep: Option<usize>,

    /// Treat a write lock older than this many seconds as abandoned.
    #[arg(long)]
    lock_stale_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = StoreConfig::from_env();
    if let Some(mount) = args.mount {
        config.preferred_mount = mount;
    }
    if let Some(local_root) = args.local_root {
        config.local_root = local_root;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(keep) = args.history_keep {
        config.history_keep = keep;
    }
    if let Some(secs) = args.lock_stale_secs {
        config.lock_stale_after = Some(std::time::Duration::from_secs(secs));
    }

    let store = DiskStore::open(&config)?;
    if store.write_lock().is_held() {
        log::warn!(
            "Write lock {:?} is present at startup; saves will be rejected until it is cleared (docvault unlock)",
            store.write_lock().path()
        );
    }

    let router = Router::new(Arc::new(store.clone()), store.root(), config.port)
        .with_save_body_limit(config.save_body_limit);

    println!("Starting DocVault daemon...");
    println!("Storage root: {}", store.root().display());
    println!("DocVault listening on :{} (HTTP)", config.port);

    tokio::select! {
        res = router.listen() => {
            if let Err(e) = res {
                eprintln!("HTTP server failed: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            println!("\nShutdown signal received. Exiting.");
        }
    }

    Ok(())
}

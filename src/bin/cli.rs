use std::path::PathBuf;
use docvault::engine::DiskStore;
use docvault::{
    sdk, BlobIngestor, DocumentReader, DocumentWriter, StoreConfig, StoreInspector, DEFAULT_SAVE_LABEL,
    UNKNOWN_ACTOR,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// External mount tried first for the storage root.
    #[arg(short, long)]
    mount: Option<PathBuf>,

    /// Fallback storage root.
    #[arg(short, long)]
    local_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Status,
    Load,
    Save {
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_SAVE_LABEL)]
        label: String,
        #[arg(long, default_value = UNKNOWN_ACTOR)]
        actor: String,
    },
    Upload {
        file: PathBuf,
        #[arg(long, default_value = "")]
        category: String,
    },
    History,
    /// Re-save a history snapshot as the current document (local root only).
    Restore {
        day: String,
        file_name: String,
        #[arg(long, default_value = "Operator")]
        actor: String,
    },
    /// Remove an abandoned write lock (local root only).
    Unlock,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(mount) = cli.mount {
        config.preferred_mount = mount;
    }
    if let Some(local_root) = cli.local_root {
        config.local_root = local_root;
    }

    match cli.command {
        Commands::Restore { day, file_name, actor } => {
            let store = DiskStore::open(&config)?;
            let receipt = store.restore(&day, &file_name, &actor).await?;
            println!("OK {}", receipt.time.to_rfc3339());
        }
        Commands::Unlock => {
            let store = DiskStore::open(&config)?;
            if store.force_unlock()? {
                println!("OK lock removed");
            } else {
                println!("OK no lock present");
            }
        }
        command => run(command, &config).await?,
    }

    Ok(())
}

async fn run(command: Commands, config: &StoreConfig) -> anyhow::Result<()> {
    let store = sdk::new(config).await?;
    match command {
        Commands::Status => {
            let status = store.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Load => {
            let doc = store.load().await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Save { file, label, actor } => {
            let doc = serde_json::from_slice(&std::fs::read(&file)?)?;
            let receipt = store.save(doc, &label, &actor).await?;
            println!("OK {}", receipt.time.to_rfc3339());
        }
        Commands::Upload { file, category } => {
            let original_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("file")
                .to_string();
            let bytes = std::fs::read(&file)?;
            let record = store.ingest(bytes, &original_name, &category).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::History => {
            let list = store.history().await?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
        Commands::Restore { .. } | Commands::Unlock => {
            anyhow::bail!("restore and unlock operate on the local storage root only")
        }
    }
    Ok(())
}

//! DocVault is a small persistence service for a single authoritative JSON document.
//!
//! The document is written as a twin pair (master + backup) under a storage root,
//! every successful save leaves a dated history snapshot behind, and uploaded files
//! are placed into a category-addressed blob store. The whole thing is exposed over
//! a minimal HTTP boundary.
//!
//! ## Core Components
//! - [`engine`]: The on-disk backend (root resolution, twin records, write lock, history, blobs).
//! - [`sdk`]: Client libraries for both embedded and remote (HTTP) modes.
//! - [`server`]: HTTP daemon implementation.
//! - [`config`]: Runtime configuration shared by the daemon and the CLI.

pub mod config;
pub mod engine;
pub mod sdk;
pub mod server;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use config::StoreConfig;

/// The opaque application state. The store never looks inside it.
pub type Document = serde_json::Value;

/// Errors returned by DocVault.
#[derive(Error, Debug)]
pub enum Error {
    /// The storage root or one of its category directories could not be created.
    #[error("storage unavailable: {0}")]
    Startup(String),
    /// A save was attempted while another save holds the write lock.
    #[error("another save is in progress, retry shortly")]
    Busy,
    /// An upload request carried no file.
    #[error("no file provided")]
    UploadRejected,
    /// The category path would leave the storage root.
    #[error("invalid category: {0}")]
    InvalidCategory(String),
    /// A filesystem write failed after the write lock was taken.
    ///
    /// Master and backup may disagree afterwards; callers should retry and re-load.
    #[error("save failed while writing {stage}: {source}")]
    PartialWrite {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
    /// The requested history snapshot does not exist.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
    /// An I/O error occurred outside of a save.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Transport error talking to a remote store.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized Result type for DocVault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Label used for saves coming from the regular client sync path.
pub const DEFAULT_SAVE_LABEL: &str = "SYNC";

/// Actor recorded when a save does not name one.
pub const UNKNOWN_ACTOR: &str = "Unknown";

/// Returned by a successful save.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveReceipt {
    pub time: DateTime<Local>,
}

/// Descriptor of one ingested file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: String,
    /// Name on disk, `<timestamp>_<sanitized original>`.
    pub file_name: String,
    pub original_name: String,
    pub category: String,
    /// `<category>/<file_name>`, relative to the storage root.
    pub path: String,
    pub upload_date: DateTime<Local>,
}

/// Point-in-time view of the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub root: PathBuf,
    pub lock_held: bool,
}

/// One archived history snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    /// Day directory, `YYYY-MM-DD`.
    pub day: String,
    pub file_name: String,
    /// Relative to the storage root, usable under `/files/`.
    pub path: String,
    pub size: u64,
}

/// Reads the current document.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Returns the current document, self-healing from the backup or the empty schema.
    async fn load(&self) -> Result<Document>;
}

/// Replaces the current document.
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    /// Writes `doc` as the new master and backup, then archives a snapshot tagged with `label` and `actor`.
    async fn save(&self, doc: Document, label: &str, actor: &str) -> Result<SaveReceipt>;
}

/// Places uploaded files into the category-addressed blob store.
#[async_trait]
pub trait BlobIngestor: Send + Sync {
    /// Stores `bytes` under `category` and returns its descriptor.
    async fn ingest(&self, bytes: Vec<u8>, original_name: &str, category: &str) -> Result<UploadRecord>;
}

/// Read-only introspection of the store.
#[async_trait]
pub trait StoreInspector: Send + Sync {
    /// Returns the storage root and whether a save is in flight.
    async fn status(&self) -> Result<StoreStatus>;
    /// Lists every retained history snapshot, newest day first.
    async fn history(&self) -> Result<Vec<SnapshotInfo>>;
}

/// The primary interface for interacting with DocVault.
///
/// Implemented by the embedded [`engine::DiskStore`] and the remote [`sdk::Client`].
pub trait SyncStore: DocumentReader + DocumentWriter + BlobIngestor + StoreInspector {}

impl<T> SyncStore for T where T: DocumentReader + DocumentWriter + BlobIngestor + StoreInspector {}

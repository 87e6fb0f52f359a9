pub mod blobs;
pub mod history;
pub mod lock;
pub mod persistence;
pub mod root;
pub mod store;

pub use blobs::BlobStore;
pub use history::HistoryArchiver;
pub use lock::WriteLock;
pub use persistence::Persistence;
pub use store::DiskStore;

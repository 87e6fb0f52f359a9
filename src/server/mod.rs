/// HTTP server implementation for the DocVault daemon.
///
/// This module provides the [`Router`] which maps the `/api` and `/files` routes
/// onto a [`crate::SyncStore`].
pub mod router;

pub use router::Router;

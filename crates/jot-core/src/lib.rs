//! jot-core - Core library for Jot
//!
//! Offline-first note storage with background synchronization: a local
//! libSQL store, durable pending-sync queues, an authenticated HTTP client
//! with token refresh, and the coordinator tying them together.

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteId};
pub use sync::{SyncCoordinator, SyncEngine};

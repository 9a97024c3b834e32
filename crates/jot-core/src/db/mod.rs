//! Database layer for Jot

mod connection;
mod migrations;
mod store;

pub use connection::Database;
pub use store::{LibSqlStore, LocalDataSource, PendingSyncQueue};

//! Pending-sync queue records

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::Error;
use crate::models::NoteId;

/// Which remote call a pending entry resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Create,
    Update,
}

impl PendingKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for PendingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            other => Err(Error::LocalWrite(format!("unknown pending kind {other:?}"))),
        }
    }
}

/// Durable marker that a note's local state has not yet been confirmed
/// accepted by the remote service. At most one entry exists per note id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSyncEntry {
    pub note_id: NoteId,
    pub kind: PendingKind,
    /// Unset until the first push attempt, bumped on every failed retry.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Durable marker recording that a delete must still be propagated remotely.
///
/// Only ever created for notes that were already confirmed remote at delete
/// time; deleting a never-synced note drops its pending entry instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedNoteTombstone {
    pub note_id: NoteId,
    pub deleted_at: DateTime<Utc>,
}

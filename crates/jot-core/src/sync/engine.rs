//! Queue-draining logic shared by manual sync and background retry jobs.

use std::sync::Arc;

use crate::db::{LocalDataSource, PendingSyncQueue};
use crate::error::Result;
use crate::models::{DeletedNoteTombstone, NoteId, PendingKind, PendingSyncEntry};
use crate::remote::RemoteDataSource;
use crate::util::utc_now;

/// Outcome of one full drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Creates/updates confirmed by the remote service
    pub pushed: usize,
    /// Stale entries dropped because their note no longer exists locally
    pub purged: usize,
    /// Tombstones confirmed by the remote service
    pub deleted: usize,
    /// Items that failed and stay queued for the next drain
    pub deferred: usize,
}

impl DrainReport {
    /// True when nothing remains queued after this pass.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        self.deferred == 0
    }
}

enum PushOutcome {
    Pushed,
    Purged,
    Deferred,
}

/// Resolves queued local mutations against the remote service.
///
/// Holds the storage and remote handles by explicit injection; there is no
/// ambient global state. Cheap to share behind an [`Arc`].
pub struct SyncEngine<L, R> {
    local: Arc<L>,
    remote: Arc<R>,
}

impl<L, R> SyncEngine<L, R>
where
    L: LocalDataSource + PendingSyncQueue + 'static,
    R: RemoteDataSource + 'static,
{
    pub fn new(local: Arc<L>, remote: Arc<R>) -> Self {
        Self { local, remote }
    }

    /// The storage handle (notes plus queue tables).
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Drain both queues in full. Never fails: every per-item error is
    /// caught at the item boundary so one bad item cannot block the rest.
    pub async fn sync_pending_notes(&self) -> DrainReport {
        let mut report = DrainReport::default();

        let entries = match self.local.list_pending().await {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(%error, "failed to read the pending queue");
                return report;
            }
        };
        for entry in entries {
            match self.push_entry(&entry).await {
                Ok(PushOutcome::Pushed) => report.pushed += 1,
                Ok(PushOutcome::Purged) => report.purged += 1,
                Ok(PushOutcome::Deferred) => report.deferred += 1,
                Err(error) => {
                    report.deferred += 1;
                    tracing::warn!(note_id = %entry.note_id, %error, "pending sync item failed");
                }
            }
        }

        let tombstones = match self.local.list_tombstones().await {
            Ok(tombstones) => tombstones,
            Err(error) => {
                tracing::warn!(%error, "failed to read the tombstone queue");
                return report;
            }
        };
        for tombstone in tombstones {
            match self.push_tombstone(&tombstone).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => report.deferred += 1,
                Err(error) => {
                    report.deferred += 1;
                    tracing::warn!(note_id = %tombstone.note_id, %error, "tombstone sync failed");
                }
            }
        }

        report
    }

    /// Drain pass scoped to one note id (used by scheduled retry jobs).
    ///
    /// Returns `true` when nothing remains queued for this note.
    pub async fn sync_note(&self, id: &NoteId) -> bool {
        match self.try_sync_note(id).await {
            Ok(settled) => settled,
            Err(error) => {
                tracing::warn!(note_id = %id, %error, "sync attempt failed");
                false
            }
        }
    }

    async fn try_sync_note(&self, id: &NoteId) -> Result<bool> {
        if let Some(entry) = self.local.get_pending(id).await? {
            return Ok(!matches!(
                self.push_entry(&entry).await?,
                PushOutcome::Deferred
            ));
        }
        if let Some(tombstone) = self.local.get_tombstone(id).await? {
            return self.push_tombstone(&tombstone).await;
        }
        // Nothing queued (already drained, or the mutation was superseded)
        Ok(true)
    }

    /// Fetch one remote page and merge it into the local store.
    ///
    /// Locally pending mutations win: notes with a pending entry or a
    /// tombstone are skipped, as is any incoming copy older than the local
    /// row by `last_edited_at`. Returns the number of notes merged.
    pub async fn refresh_page(&self, page: u32, size: u32) -> Result<usize> {
        let incoming = self.remote.get_notes(page, size).await?;

        let mut accepted = Vec::with_capacity(incoming.len());
        for note in incoming {
            if self.local.get_pending(&note.id).await?.is_some()
                || self.local.get_tombstone(&note.id).await?.is_some()
            {
                continue;
            }
            if let Some(existing) = self.local.get_note_by_id(&note.id).await? {
                if existing.last_edited_at > note.last_edited_at {
                    tracing::debug!(note_id = %note.id, "kept newer local copy over remote");
                    continue;
                }
            }
            accepted.push(note);
        }

        let merged = accepted.len();
        self.local.upsert_notes(&accepted).await?;
        Ok(merged)
    }

    async fn push_entry(&self, entry: &PendingSyncEntry) -> Result<PushOutcome> {
        let Some(note) = self.local.get_note_by_id(&entry.note_id).await? else {
            // Deleted after being queued; nothing to tell the server
            self.local.remove_pending(&entry.note_id).await?;
            tracing::debug!(note_id = %entry.note_id, "purged pending entry for deleted note");
            return Ok(PushOutcome::Purged);
        };

        let pushed = match entry.kind {
            PendingKind::Create => self.remote.post_note(&note).await,
            PendingKind::Update => self.remote.update_note(&note).await,
        };

        match pushed {
            Ok(()) => {
                self.local.remove_pending(&entry.note_id).await?;
                tracing::debug!(note_id = %entry.note_id, kind = %entry.kind, "pending sync confirmed");
                Ok(PushOutcome::Pushed)
            }
            Err(error) => {
                tracing::debug!(note_id = %entry.note_id, %error, "remote push failed; entry stays queued");
                self.local.touch_pending(&entry.note_id, utc_now()).await?;
                Ok(PushOutcome::Deferred)
            }
        }
    }

    async fn push_tombstone(&self, tombstone: &DeletedNoteTombstone) -> Result<bool> {
        match self.remote.delete_note(&tombstone.note_id).await {
            Ok(()) => {
                self.local.remove_tombstone(&tombstone.note_id).await?;
                tracing::debug!(note_id = %tombstone.note_id, "remote delete confirmed");
                Ok(true)
            }
            Err(error) => {
                tracing::debug!(note_id = %tombstone.note_id, %error, "remote delete failed; tombstone stays queued");
                Ok(false)
            }
        }
    }
}

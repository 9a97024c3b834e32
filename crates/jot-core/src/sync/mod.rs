//! Offline-first note synchronization.
//!
//! Writes land in the local store before any network attempt and reads never
//! block on the network. Each local mutation leaves a durable marker (a
//! pending entry for creates/updates, a tombstone for deletes) that the
//! engine drains against the remote service, either through scheduled
//! bounded-retry jobs or an explicit sync.

mod engine;
mod scheduler;


pub use engine::{DrainReport, SyncEngine};
pub use scheduler::{NoopScheduler, RetryPolicy, SyncRunScheduler, SyncTask, TokioRetryScheduler};

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::db::{LocalDataSource, PendingSyncQueue};
use crate::error::Result;
use crate::models::{Note, NoteId, PendingKind};
use crate::remote::RemoteDataSource;
use crate::util::utc_now;

/// Application-lifetime task scope.
///
/// Work submitted here outlives the request that triggered it, so a caller
/// going away does not abort an in-flight background refresh. Tasks are
/// dropped with the owning coordinator, not with their submitter.
struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap whatever already finished so the set stays small
        while tasks.try_join_next().is_some() {}
        tasks.spawn(future);
    }
}

/// The note repository boundary the application is built on.
///
/// Local-first: every operation succeeds if and only if its local write
/// succeeds; remote failures are absorbed into the queue and retried in the
/// background, never surfaced here.
pub struct SyncCoordinator<L, R, S> {
    engine: Arc<SyncEngine<L, R>>,
    scheduler: S,
    background: BackgroundTasks,
}

impl<L, R, S> SyncCoordinator<L, R, S>
where
    L: LocalDataSource + PendingSyncQueue + 'static,
    R: RemoteDataSource + 'static,
    S: SyncRunScheduler,
{
    pub fn new(engine: Arc<SyncEngine<L, R>>, scheduler: S) -> Self {
        Self {
            engine,
            scheduler,
            background: BackgroundTasks::new(),
        }
    }

    /// Persist a new note locally and queue its remote create.
    ///
    /// Offline creation always succeeds; only a failed local write errors.
    pub async fn create_note(&self, note: Note) -> Result<Note> {
        self.engine.local().create_note(&note).await?;
        self.engine
            .local()
            .upsert_pending(&note.id, PendingKind::Create, Some(utc_now()))
            .await?;
        self.scheduler.schedule_sync(SyncTask::CreateNote(note.clone()));
        Ok(note)
    }

    /// Persist an edit locally and queue its remote update.
    ///
    /// `last_edited_at` must already reflect the edit; the coordinator does
    /// not stamp it.
    pub async fn update_note(&self, note: Note) -> Result<Note> {
        self.engine.local().update_note(&note).await?;
        self.engine
            .local()
            .upsert_pending(&note.id, PendingKind::Update, Some(utc_now()))
            .await?;
        self.scheduler.schedule_sync(SyncTask::UpdateNote(note.clone()));
        Ok(note)
    }

    /// Delete a note locally and, if it was ever confirmed remote, queue the
    /// remote delete.
    pub async fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.engine.local().delete_note(id).await?;

        if self.engine.local().remove_pending(id).await? {
            // Never confirmed remote: dropping the pending entry is enough,
            // the server has nothing to forget
            return Ok(());
        }

        self.engine.local().insert_tombstone(id, utc_now()).await?;
        self.scheduler.schedule_sync(SyncTask::DeleteNote(id.clone()));
        Ok(())
    }

    /// One local page immediately, plus a fire-and-forget remote refresh of
    /// the same page merged in the background.
    pub async fn get_notes(&self, page: u32, size: u32) -> Result<Vec<Note>> {
        let notes = self.engine.local().get_notes(page, size).await?;

        let engine = Arc::clone(&self.engine);
        self.background.spawn(async move {
            match engine.refresh_page(page, size).await {
                Ok(merged) => {
                    tracing::debug!(page, size, merged, "background page refresh done");
                }
                Err(error) => {
                    tracing::debug!(page, size, %error, "background page refresh failed");
                }
            }
        });

        Ok(notes)
    }

    /// Live view of the full note list (see
    /// [`LocalDataSource::observe_notes`]).
    pub fn observe_notes(&self) -> watch::Receiver<Vec<Note>> {
        self.engine.local().observe_notes()
    }

    /// Drain both queues now. Never fails; per-item failures stay queued.
    pub async fn sync_pending_notes(&self) -> DrainReport {
        self.engine.sync_pending_notes().await
    }

    /// Stop all scheduled retry jobs without rolling back partial effects.
    pub fn cancel_all_syncs(&self) {
        self.scheduler.cancel_all_syncs();
    }
}

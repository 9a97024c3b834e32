//! Bounded-retry background jobs for queued mutations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::db::{LocalDataSource, PendingSyncQueue};
use crate::models::{Note, NoteId};
use crate::remote::RemoteDataSource;

use super::engine::SyncEngine;

/// A retryable unit of background work.
#[derive(Debug, Clone)]
pub enum SyncTask {
    CreateNote(Note),
    UpdateNote(Note),
    DeleteNote(NoteId),
    FetchNotes { page: u32, size: u32 },
}

impl SyncTask {
    /// Coalescing key: all mutations of one note share a key, so
    /// re-scheduling while a job is live is a no-op.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::CreateNote(note) | Self::UpdateNote(note) => format!("note:{}", note.id),
            Self::DeleteNote(id) => format!("note:{id}"),
            Self::FetchNotes { .. } => "fetch".to_string(),
        }
    }
}

/// Scheduler interface consumed by the coordinator.
pub trait SyncRunScheduler: Send + Sync {
    /// Enqueue one retryable job for the task; same-key re-scheduling
    /// coalesces rather than duplicates.
    fn schedule_sync(&self, task: SyncTask);

    /// Stop all scheduled jobs. Partial effects are not rolled back.
    fn cancel_all_syncs(&self);
}

impl<T: SyncRunScheduler + ?Sized> SyncRunScheduler for Arc<T> {
    fn schedule_sync(&self, task: SyncTask) {
        (**self).schedule_sync(task);
    }

    fn cancel_all_syncs(&self) {
        (**self).cancel_all_syncs();
    }
}

/// Scheduler that drops every request (local-only mode, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl SyncRunScheduler for NoopScheduler {
    fn schedule_sync(&self, _task: SyncTask) {}

    fn cancel_all_syncs(&self) {}
}

/// Attempt budget and backoff for one job.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per job before it is permanently failed
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt after that
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1 << exponent)
    }
}

type JobTable = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Tokio-backed bounded-retry scheduler.
///
/// Each job invokes the engine's per-note drain until it settles or the
/// attempt budget runs out. An exhausted job is never rescheduled; its
/// queue entry survives until a later manual `sync_pending_notes` succeeds.
pub struct TokioRetryScheduler<L, R> {
    engine: Arc<SyncEngine<L, R>>,
    policy: RetryPolicy,
    jobs: JobTable,
}

impl<L, R> TokioRetryScheduler<L, R>
where
    L: LocalDataSource + PendingSyncQueue + 'static,
    R: RemoteDataSource + 'static,
{
    pub fn new(engine: Arc<SyncEngine<L, R>>, policy: RetryPolicy) -> Self {
        Self {
            engine,
            policy,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of jobs currently live (scheduled and not yet finished).
    pub fn active_jobs(&self) -> usize {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl<L, R> SyncRunScheduler for TokioRetryScheduler<L, R>
where
    L: LocalDataSource + PendingSyncQueue + 'static,
    R: RemoteDataSource + 'static,
{
    fn schedule_sync(&self, task: SyncTask) {
        let key = task.key();
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = jobs.get(&key) {
            if !handle.is_finished() {
                tracing::debug!(%key, "sync job already live; coalescing");
                return;
            }
        }

        let engine = Arc::clone(&self.engine);
        let policy = self.policy.clone();
        let table = Arc::clone(&self.jobs);
        let job_key = key.clone();
        let handle = tokio::spawn(async move {
            run_job(&engine, &policy, &task).await;
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&job_key);
        });
        jobs.insert(key, handle);
    }

    fn cancel_all_syncs(&self) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for (key, handle) in jobs.drain() {
            tracing::debug!(%key, "cancelling sync job");
            handle.abort();
        }
    }
}

async fn run_job<L, R>(engine: &SyncEngine<L, R>, policy: &RetryPolicy, task: &SyncTask)
where
    L: LocalDataSource + PendingSyncQueue + 'static,
    R: RemoteDataSource + 'static,
{
    for attempt in 1..=policy.max_attempts {
        if run_attempt(engine, task).await {
            return;
        }
        if attempt == policy.max_attempts {
            // Terminal failure: the queue entry stays behind for a manual
            // sync; nothing reschedules this job.
            tracing::warn!(
                key = %task.key(),
                attempts = attempt,
                "sync job permanently failed; entry remains queued"
            );
            return;
        }
        tokio::time::sleep(policy.delay_after(attempt)).await;
    }
}

async fn run_attempt<L, R>(engine: &SyncEngine<L, R>, task: &SyncTask) -> bool
where
    L: LocalDataSource + PendingSyncQueue + 'static,
    R: RemoteDataSource + 'static,
{
    match task {
        SyncTask::CreateNote(note) | SyncTask::UpdateNote(note) => {
            engine.sync_note(&note.id).await
        }
        SyncTask::DeleteNote(id) => engine.sync_note(id).await,
        SyncTask::FetchNotes { page, size } => engine.refresh_page(*page, *size).await.is_ok(),
    }
}

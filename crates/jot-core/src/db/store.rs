//! Local note storage and the pending-sync queue tables.
//!
//! [`LibSqlStore`] implements both [`LocalDataSource`] and
//! [`PendingSyncQueue`] over a single database so the notes table and the
//! queue tables share one durability domain. All mutation is single-row
//! upsert/delete keyed by note id; the storage layer serializes conflicting
//! writes.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row, Value};
use tokio::sync::{watch, Mutex};

use crate::error::{Error, Result};
use crate::models::{DeletedNoteTombstone, Note, NoteId, PendingKind, PendingSyncEntry};
use crate::util::{format_timestamp, parse_timestamp};

/// Storage interface for notes (consumed by the sync layer).
#[async_trait]
pub trait LocalDataSource: Send + Sync {
    /// Persist a brand-new note
    async fn create_note(&self, note: &Note) -> Result<()>;

    /// Overwrite an existing note
    async fn update_note(&self, note: &Note) -> Result<()>;

    /// One page of notes, 1-indexed, ordered by last edit (newest first)
    async fn get_notes(&self, page: u32, size: u32) -> Result<Vec<Note>>;

    /// Point lookup by id
    async fn get_note_by_id(&self, id: &NoteId) -> Result<Option<Note>>;

    /// Insert-or-overwrite a batch of notes (used by the remote merge)
    async fn upsert_notes(&self, notes: &[Note]) -> Result<()>;

    /// Remove a note
    async fn delete_note(&self, id: &NoteId) -> Result<()>;

    /// Live view of the full note list, re-emitted on every mutation.
    ///
    /// Each subscriber gets its own receiver; dropping it cancels the
    /// subscription.
    fn observe_notes(&self) -> watch::Receiver<Vec<Note>>;
}

/// Storage interface for the two sync queues.
#[async_trait]
pub trait PendingSyncQueue: Send + Sync {
    /// Insert or replace the pending entry for a note
    async fn upsert_pending(
        &self,
        id: &NoteId,
        kind: PendingKind,
        attempt_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn get_pending(&self, id: &NoteId) -> Result<Option<PendingSyncEntry>>;

    async fn list_pending(&self) -> Result<Vec<PendingSyncEntry>>;

    /// Remove the pending entry; returns whether one existed
    async fn remove_pending(&self, id: &NoteId) -> Result<bool>;

    /// Bump `last_attempt_at` after a failed push
    async fn touch_pending(&self, id: &NoteId, attempt_at: DateTime<Utc>) -> Result<()>;

    async fn insert_tombstone(&self, id: &NoteId, deleted_at: DateTime<Utc>) -> Result<()>;

    async fn get_tombstone(&self, id: &NoteId) -> Result<Option<DeletedNoteTombstone>>;

    async fn list_tombstones(&self) -> Result<Vec<DeletedNoteTombstone>>;

    /// Remove the tombstone; returns whether one existed
    async fn remove_tombstone(&self, id: &NoteId) -> Result<bool>;
}

const SELECT_NOTE: &str = "SELECT id, title, content, created_at, last_edited_at FROM notes";

/// libSQL-backed implementation of both storage interfaces.
#[derive(Clone)]
pub struct LibSqlStore {
    db: Arc<Mutex<super::Database>>,
    notes_tx: watch::Sender<Vec<Note>>,
}

impl LibSqlStore {
    /// Open a store at the given filesystem path.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_database(super::Database::open(path).await?).await
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        Self::from_database(super::Database::open_in_memory().await?).await
    }

    async fn from_database(db: super::Database) -> Result<Self> {
        let initial = Self::query_all(db.connection()).await?;
        let (notes_tx, _) = watch::channel(initial);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            notes_tx,
        })
    }

    /// Re-read the full list and publish it to observers.
    async fn publish_notes(&self, conn: &Connection) -> Result<()> {
        let notes = Self::query_all(conn).await?;
        self.notes_tx.send_replace(notes);
        Ok(())
    }

    async fn query_all(conn: &Connection) -> Result<Vec<Note>> {
        let mut rows = conn
            .query(
                &format!("{SELECT_NOTE} ORDER BY last_edited_at DESC, id DESC"),
                (),
            )
            .await?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(parse_note(&row)?);
        }
        Ok(notes)
    }
}

fn parse_note(row: &Row) -> Result<Note> {
    let id: String = row.get(0)?;
    Ok(Note {
        id: NoteId::from_str(&id)?,
        title: row.get(1)?,
        content: row.get(2)?,
        created_at: parse_timestamp(&row.get::<String>(3)?)?,
        last_edited_at: parse_timestamp(&row.get::<String>(4)?)?,
    })
}

fn parse_optional_timestamp(value: &Value) -> Result<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::Text(raw) => parse_timestamp(raw).map(Some),
        other => Err(Error::LocalWrite(format!(
            "unexpected timestamp column value: {other:?}"
        ))),
    }
}

#[async_trait]
impl LocalDataSource for LibSqlStore {
    async fn create_note(&self, note: &Note) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute(
            "INSERT INTO notes (id, title, content, created_at, last_edited_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                note.id.to_string(),
                note.title.clone(),
                note.content.clone(),
                format_timestamp(&note.created_at),
                format_timestamp(&note.last_edited_at),
            ],
        )
        .await?;

        self.publish_notes(conn).await
    }

    async fn update_note(&self, note: &Note) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let rows = conn
            .execute(
                "UPDATE notes SET title = ?2, content = ?3, last_edited_at = ?4 WHERE id = ?1",
                params![
                    note.id.to_string(),
                    note.title.clone(),
                    note.content.clone(),
                    format_timestamp(&note.last_edited_at),
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(note.id.to_string()));
        }

        self.publish_notes(conn).await
    }

    async fn get_notes(&self, page: u32, size: u32) -> Result<Vec<Note>> {
        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(size);

        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!(
                    "{SELECT_NOTE} ORDER BY last_edited_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                ),
                params![i64::from(size), offset],
            )
            .await?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next().await? {
            notes.push(parse_note(&row)?);
        }
        Ok(notes)
    }

    async fn get_note_by_id(&self, id: &NoteId) -> Result<Option<Note>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                &format!("{SELECT_NOTE} WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_note(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_notes(&self, notes: &[Note]) -> Result<()> {
        if notes.is_empty() {
            return Ok(());
        }

        let db = self.db.lock().await;
        let conn = db.connection();
        for note in notes {
            conn.execute(
                "INSERT INTO notes (id, title, content, created_at, last_edited_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     title = excluded.title,
                     content = excluded.content,
                     created_at = excluded.created_at,
                     last_edited_at = excluded.last_edited_at",
                params![
                    note.id.to_string(),
                    note.title.clone(),
                    note.content.clone(),
                    format_timestamp(&note.created_at),
                    format_timestamp(&note.last_edited_at),
                ],
            )
            .await?;
        }

        self.publish_notes(conn).await
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let rows = conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id.to_string()])
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        self.publish_notes(conn).await
    }

    fn observe_notes(&self) -> watch::Receiver<Vec<Note>> {
        self.notes_tx.subscribe()
    }
}

#[async_trait]
impl PendingSyncQueue for LibSqlStore {
    async fn upsert_pending(
        &self,
        id: &NoteId,
        kind: PendingKind,
        attempt_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        match attempt_at {
            Some(at) => {
                conn.execute(
                    "INSERT INTO pending_sync (note_id, kind, last_attempt_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(note_id) DO UPDATE SET
                         kind = excluded.kind,
                         last_attempt_at = excluded.last_attempt_at",
                    params![id.to_string(), kind.as_str(), format_timestamp(&at)],
                )
                .await?;
            }
            None => {
                conn.execute(
                    "INSERT INTO pending_sync (note_id, kind, last_attempt_at)
                     VALUES (?1, ?2, NULL)
                     ON CONFLICT(note_id) DO UPDATE SET
                         kind = excluded.kind,
                         last_attempt_at = NULL",
                    params![id.to_string(), kind.as_str()],
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn get_pending(&self, id: &NoteId) -> Result<Option<PendingSyncEntry>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT note_id, kind, last_attempt_at FROM pending_sync WHERE note_id = ?1",
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_pending(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_pending(&self) -> Result<Vec<PendingSyncEntry>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT note_id, kind, last_attempt_at FROM pending_sync ORDER BY note_id",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(parse_pending(&row)?);
        }
        Ok(entries)
    }

    async fn remove_pending(&self, id: &NoteId) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db
            .connection()
            .execute(
                "DELETE FROM pending_sync WHERE note_id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn touch_pending(&self, id: &NoteId, attempt_at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "UPDATE pending_sync SET last_attempt_at = ?2 WHERE note_id = ?1",
                params![id.to_string(), format_timestamp(&attempt_at)],
            )
            .await?;
        Ok(())
    }

    async fn insert_tombstone(&self, id: &NoteId, deleted_at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute(
                "INSERT INTO deleted_notes (note_id, deleted_at)
                 VALUES (?1, ?2)
                 ON CONFLICT(note_id) DO UPDATE SET deleted_at = excluded.deleted_at",
                params![id.to_string(), format_timestamp(&deleted_at)],
            )
            .await?;
        Ok(())
    }

    async fn get_tombstone(&self, id: &NoteId) -> Result<Option<DeletedNoteTombstone>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT note_id, deleted_at FROM deleted_notes WHERE note_id = ?1",
                params![id.to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_tombstone(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_tombstones(&self) -> Result<Vec<DeletedNoteTombstone>> {
        let db = self.db.lock().await;
        let mut rows = db
            .connection()
            .query(
                "SELECT note_id, deleted_at FROM deleted_notes ORDER BY note_id",
                (),
            )
            .await?;

        let mut tombstones = Vec::new();
        while let Some(row) = rows.next().await? {
            tombstones.push(parse_tombstone(&row)?);
        }
        Ok(tombstones)
    }

    async fn remove_tombstone(&self, id: &NoteId) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db
            .connection()
            .execute(
                "DELETE FROM deleted_notes WHERE note_id = ?1",
                params![id.to_string()],
            )
            .await?;
        Ok(rows > 0)
    }
}

fn parse_pending(row: &Row) -> Result<PendingSyncEntry> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    Ok(PendingSyncEntry {
        note_id: NoteId::from_str(&id)?,
        kind: kind.parse()?,
        last_attempt_at: parse_optional_timestamp(&row.get_value(2)?)?,
    })
}

fn parse_tombstone(row: &Row) -> Result<DeletedNoteTombstone> {
    let id: String = row.get(0)?;
    Ok(DeletedNoteTombstone {
        note_id: NoteId::from_str(&id)?,
        deleted_at: parse_timestamp(&row.get::<String>(1)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::utc_now;
    use pretty_assertions::assert_eq;

    async fn setup() -> LibSqlStore {
        LibSqlStore::open_in_memory().await.unwrap()
    }

    fn note(title: &str, edited_at: &str) -> Note {
        let at = parse_timestamp(edited_at).unwrap();
        Note {
            id: NoteId::generate(),
            title: title.to_string(),
            content: format!("{title} body"),
            created_at: at,
            last_edited_at: at,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_and_get() {
        let store = setup().await;
        let created = Note::new("Hello", "world");

        store.create_note(&created).await.unwrap();

        let fetched = store.get_note_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_rejects_duplicate_id() {
        let store = setup().await;
        let created = Note::new("Once", "only");

        store.create_note(&created).await.unwrap();
        assert!(store.create_note(&created).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_notes_orders_and_paginates() {
        let store = setup().await;
        let oldest = note("oldest", "2024-01-01T00:00:00.000000Z");
        let middle = note("middle", "2024-01-02T00:00:00.000000Z");
        let newest = note("newest", "2024-01-03T00:00:00.000000Z");
        for n in [&oldest, &middle, &newest] {
            store.create_note(n).await.unwrap();
        }

        let first_page = store.get_notes(1, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].title, "newest");
        assert_eq!(first_page[1].title, "middle");

        let second_page = store.get_notes(2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].title, "oldest");

        // Page index is 1-based; 0 is clamped to the first page
        let clamped = store.get_notes(0, 2).await.unwrap();
        assert_eq!(clamped, first_page);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_note() {
        let store = setup().await;
        let mut created = Note::new("Original", "text");
        store.create_note(&created).await.unwrap();

        created.content = "rewritten".to_string();
        created.touch();
        store.update_note(&created).await.unwrap();

        let fetched = store.get_note_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.content, "rewritten");
        assert_eq!(fetched.last_edited_at, created.last_edited_at);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_missing_note_is_not_found() {
        let store = setup().await;
        let ghost = Note::new("Ghost", "");
        assert!(matches!(
            store.update_note(&ghost).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_note() {
        let store = setup().await;
        let created = Note::new("Doomed", "");
        store.create_note(&created).await.unwrap();

        store.delete_note(&created.id).await.unwrap();
        assert!(store.get_note_by_id(&created.id).await.unwrap().is_none());

        assert!(matches!(
            store.delete_note(&created.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_overwrites() {
        let store = setup().await;
        let mut incoming = note("v1", "2024-01-01T00:00:00.000000Z");
        store.upsert_notes(std::slice::from_ref(&incoming)).await.unwrap();

        incoming.title = "v2".to_string();
        incoming.last_edited_at = parse_timestamp("2024-01-05T00:00:00.000000Z").unwrap();
        store.upsert_notes(std::slice::from_ref(&incoming)).await.unwrap();

        let notes = store.get_notes(1, 10).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "v2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_observe_notes_sees_mutations() {
        let store = setup().await;
        let mut watcher = store.observe_notes();
        assert!(watcher.borrow().is_empty());

        let created = Note::new("Watched", "");
        store.create_note(&created).await.unwrap();

        watcher.changed().await.unwrap();
        let snapshot = watcher.borrow_and_update().clone();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, created.id);

        store.delete_note(&created.id).await.unwrap();
        watcher.changed().await.unwrap();
        assert!(watcher.borrow().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pending_queue_round_trip() {
        let store = setup().await;
        let id = NoteId::generate();

        store
            .upsert_pending(&id, PendingKind::Create, None)
            .await
            .unwrap();
        let entry = store.get_pending(&id).await.unwrap().unwrap();
        assert_eq!(entry.kind, PendingKind::Create);
        assert_eq!(entry.last_attempt_at, None);

        // Re-upserting replaces the kind (at most one entry per note)
        let at = utc_now();
        store
            .upsert_pending(&id, PendingKind::Update, Some(at))
            .await
            .unwrap();
        let entry = store.get_pending(&id).await.unwrap().unwrap();
        assert_eq!(entry.kind, PendingKind::Update);
        assert_eq!(entry.last_attempt_at, Some(at));
        assert_eq!(store.list_pending().await.unwrap().len(), 1);

        assert!(store.remove_pending(&id).await.unwrap());
        assert!(!store.remove_pending(&id).await.unwrap());
        assert!(store.get_pending(&id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_touch_pending_bumps_attempt_time() {
        let store = setup().await;
        let id = NoteId::generate();
        store
            .upsert_pending(&id, PendingKind::Create, None)
            .await
            .unwrap();

        let at = utc_now();
        store.touch_pending(&id, at).await.unwrap();

        let entry = store.get_pending(&id).await.unwrap().unwrap();
        assert_eq!(entry.last_attempt_at, Some(at));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tombstone_round_trip() {
        let store = setup().await;
        let id = NoteId::generate();
        let deleted_at = utc_now();

        store.insert_tombstone(&id, deleted_at).await.unwrap();
        let tombstone = store.get_tombstone(&id).await.unwrap().unwrap();
        assert_eq!(tombstone.deleted_at, deleted_at);
        assert_eq!(store.list_tombstones().await.unwrap().len(), 1);

        assert!(store.remove_tombstone(&id).await.unwrap());
        assert!(!store.remove_tombstone(&id).await.unwrap());
        assert!(store.get_tombstone(&id).await.unwrap().is_none());
    }
}

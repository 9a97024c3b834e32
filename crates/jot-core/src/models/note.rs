//! Note model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::util::utc_now;

/// Opaque unique identifier for a note.
///
/// Generated client-side at creation time (UUID v7 underneath, so ids are
/// time-sortable), which lets a note be created fully offline without a
/// server round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Mint a new unique note ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("note id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// A note in the system.
///
/// Serializes with camelCase field names, which is also the wire format the
/// sync service speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier, assigned once at creation
    pub id: NoteId,
    /// Short title shown in listings
    pub title: String,
    /// Note body
    pub content: String,
    /// Creation timestamp, immutable after creation
    pub created_at: DateTime<Utc>,
    /// Bumped on every edit; drives the listing order
    pub last_edited_at: DateTime<Utc>,
}

impl Note {
    /// Create a new note with the given title and content
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = utc_now();
        Self {
            id: NoteId::generate(),
            title: title.into(),
            content: content.into(),
            created_at: now,
            last_edited_at: now,
        }
    }

    /// Mark the note as edited now.
    ///
    /// Callers mutate `title`/`content` and then call this; the sync layer
    /// never stamps edit times itself.
    pub fn touch(&mut self) {
        self.last_edited_at = utc_now();
    }

    /// Check if the note is empty (whitespace-only title and content)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.content.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::generate();
        let id2 = NoteId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_id_parse() {
        let id = NoteId::generate();
        let parsed: NoteId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_id_parse_rejects_empty() {
        assert!(" \n ".parse::<NoteId>().is_err());
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Groceries", "milk, eggs");
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "milk, eggs");
        assert_eq!(note.created_at, note.last_edited_at);
    }

    #[test]
    fn test_touch_bumps_edit_time() {
        let mut note = Note::new("T", "C");
        let created = note.created_at;
        note.touch();
        assert!(note.last_edited_at >= created);
        assert_eq!(note.created_at, created);
    }

    #[test]
    fn test_wire_format_uses_camel_case() {
        let note = Note::new("T", "C");
        let value = serde_json::to_value(&note).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("lastEditedAt").is_some());
        assert!(value.get("created_at").is_none());
    }

    #[test]
    fn test_wire_round_trip() {
        let note = Note::new("Round", "trip");
        let json = serde_json::to_string(&note).unwrap();
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_is_empty() {
        let empty = Note::new("  ", " \n ");
        assert!(empty.is_empty());

        let not_empty = Note::new("", "Hello");
        assert!(!not_empty.is_empty());
    }
}

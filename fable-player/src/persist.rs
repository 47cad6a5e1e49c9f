//! Snapshot persistence for the global player
//!
//! One snapshot under one well-known key, written best-effort. Persistence
//! is an optimization, not a correctness requirement: a corrupt or missing
//! snapshot degrades to "nothing to restore", and write failures are logged
//! and swallowed by the caller.

use chrono::{DateTime, Utc};
use fable_common::{Chapter, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Serialized playback position/identity, restored after a process restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub current_book_id: Option<String>,
    pub current_chapter_id: Option<String>,
    /// Chapter value as last seen, so restore needs no catalog round-trip
    pub current_chapter: Option<Chapter>,
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub duration: f64,
    pub audio_source: Option<String>,
    #[serde(default = "Utc::now")]
    pub saved_at: DateTime<Utc>,
}

impl PlaybackSnapshot {
    /// Presence of both ids is necessary and sufficient to attempt a restore.
    pub fn is_restorable(&self) -> bool {
        self.current_book_id.is_some() && self.current_chapter_id.is_some()
    }
}

/// Durable storage for the single playback snapshot. One writer per
/// process; last write wins.
pub trait SnapshotStore: Send + Sync {
    /// Read the snapshot. Absent or unparseable content yields `None`.
    fn load(&self) -> Option<PlaybackSnapshot>;
    fn save(&self, snapshot: &PlaybackSnapshot) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// File-backed store: one JSON document, written via temp-file rename so a
/// crash mid-write never leaves a truncated snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Option<PlaybackSnapshot> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No playback snapshot");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Discarding corrupt playback snapshot"
                );
                None
            }
        }
    }

    fn save(&self, snapshot: &PlaybackSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Persistence(format!("create {}: {e}", parent.display())))?;
        }
        let contents = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| Error::Persistence(format!("serialize snapshot: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .map_err(|e| Error::Persistence(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Persistence(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<PlaybackSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PlaybackSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Option<PlaybackSnapshot> {
        self.slot.lock().ok()?.clone()
    }

    fn save(&self, snapshot: &PlaybackSnapshot) -> Result<()> {
        *self
            .slot
            .lock()
            .map_err(|_| Error::Persistence("store poisoned".into()))? = Some(snapshot.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self
            .slot
            .lock()
            .map_err(|_| Error::Persistence("store poisoned".into()))? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_book_id: Some("book-1".into()),
            current_chapter_id: Some("ch-3".into()),
            current_chapter: Some(Chapter {
                id: "ch-3".into(),
                title: "Three".into(),
                audio_source: "books/book-1/ch3.mp3".into(),
                duration: 120.0,
                format: None,
            }),
            current_time: 42.0,
            duration: 120.0,
            audio_source: Some("books/book-1/ch3.mp3".into()),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        assert!(store.load().is_none());

        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.current_book_id, snapshot.current_book_id);
        assert_eq!(loaded.current_time, 42.0);

        store.clear().unwrap();
        assert!(store.load().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_json_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load().is_none());
    }

    #[test]
    fn test_snapshot_restorable_requires_both_ids() {
        let mut snapshot = sample_snapshot();
        assert!(snapshot.is_restorable());
        snapshot.current_chapter_id = None;
        assert!(!snapshot.is_restorable());
    }

    #[test]
    fn test_snapshot_json_is_camel_case() {
        let value = serde_json::to_value(sample_snapshot()).unwrap();
        assert!(value.get("currentBookId").is_some());
        assert!(value.get("currentChapterId").is_some());
        assert!(value.get("audioSource").is_some());
    }

    #[test]
    fn test_snapshot_without_saved_at_still_parses() {
        let json = r#"{
            "currentBookId": "b",
            "currentChapterId": "c",
            "currentChapter": null,
            "currentTime": 7.5,
            "duration": 100.0,
            "audioSource": "books/b/c.mp3"
        }"#;
        let snapshot: PlaybackSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.current_time, 7.5);
        assert!(snapshot.is_restorable());
    }
}

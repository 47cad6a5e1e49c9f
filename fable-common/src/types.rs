//! Core value types shared between the playback core and its callers
//!
//! Field names serialize in camelCase to match the JSON shapes exchanged
//! with the catalog backend and the persisted snapshot.

use serde::{Deserialize, Serialize};

/// A chapter as handed over by the book-catalog layer.
///
/// Immutable from the playback core's perspective. `duration` is the
/// catalog's authoritative fallback in seconds, used until the engine
/// reports a real value (streaming engines often only know the true
/// duration after enough bytes have buffered).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    /// Opaque storage path or a directly fetchable URL
    pub audio_source: String,
    /// Declared duration in seconds (0.0 when unknown)
    #[serde(default)]
    pub duration: f64,
    /// Optional container-format hints, passed through to the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Vec<String>>,
}

/// Logical playback status exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// No loaded engine handle (includes load-in-flight and load-failed)
    Pending,
    /// Loaded, not currently advancing
    Paused,
    /// Loaded and advancing
    Playing,
}

impl PlaybackStatus {
    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackStatus::Playing)
    }
}

/// Read-only observable view of a player, published over a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackView {
    pub status: PlaybackStatus,
    /// Seconds; engine-reported once positive, catalog fallback otherwise
    pub duration: f64,
    /// Seconds from the start of the current source
    pub current_time: f64,
    /// True while resolution or engine load is in flight
    pub is_initializing: bool,
}

impl Default for PlaybackView {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Pending,
            duration: 0.0,
            current_time: 0.0,
            is_initializing: false,
        }
    }
}

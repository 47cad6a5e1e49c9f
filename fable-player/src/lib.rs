//! # Fable Player Library (fable-player)
//!
//! Playback core for the fable audiobook client.
//!
//! **Purpose:** Wrap an imperative, callback-driven audio engine behind a
//! reactive, observable state machine; resolve opaque storage paths into
//! playable URLs; and persist/restore the global playback position across
//! process restarts.
//!
//! **Architecture:** Two player flavors over one engine bridge. The scoped
//! [`Player`] is created per chapter-in-view and dies with it; the
//! [`GlobalPlayer`] lives for the whole process, owns at most one engine at a
//! time, and carries the persistence and chapter-switch semantics. Both
//! expose the same observable surface (`status`/`duration`/`current_time`
//! plus watch-channel subscription).

pub mod bridge;
pub mod context;
pub mod engine;
pub mod global;
pub mod persist;
pub mod player;
pub mod resolver;

pub use context::PlayerContext;
pub use fable_common::{Chapter, Error, PlaybackStatus, PlaybackView, PlayerConfig, Result};
pub use global::GlobalPlayer;
pub use persist::{JsonFileStore, MemoryStore, PlaybackSnapshot, SnapshotStore};
pub use player::{Player, PlayerSource};
pub use resolver::UrlResolver;

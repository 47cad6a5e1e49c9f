//! Audio-engine seam
//!
//! The engine is an imperative, callback-driven collaborator: one sound per
//! instance, loaded asynchronously on creation, reporting state changes as
//! one-shot events over a channel. It never exposes continuous progress;
//! the bridge synthesizes that. Engines are created through a factory so the
//! players can be tested against a scripted fake.

pub mod rodio;

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub use self::rodio::RodioEngineFactory;

/// Opaque engine-assigned sound id, handed out once a load completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl SoundHandle {
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/// What to load and how to start.
#[derive(Debug, Clone)]
pub struct EngineSpec {
    /// Resolved, directly fetchable URL (or local path)
    pub url: String,
    /// Container-format hints passed through from the chapter
    pub format: Option<Vec<String>>,
    /// Start playing as soon as the load completes
    pub autoplay: bool,
}

/// One-shot engine callbacks, delivered over the channel given at creation.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Load completed; `duration` is the engine-reported length in seconds
    /// when known (streaming sources may not know it yet)
    Loaded {
        handle: SoundHandle,
        duration: Option<f64>,
    },
    /// Load or decode failed; the engine instance is unusable afterwards
    LoadFailed { message: String },
    Played,
    Paused,
    Ended,
    Seeked,
}

/// Imperative control surface of one loaded (or loading) sound.
///
/// Commands on a not-yet-loaded engine are accepted and may be dropped by
/// the implementation; the bridge gates them on the load callback anyway.
/// Queries are cheap and non-blocking.
pub trait AudioEngine: Send {
    fn play(&self);
    fn pause(&self);
    /// Reposition without changing the play/pause state.
    fn seek(&self, seconds: f64);
    fn is_playing(&self) -> bool;
    /// Seconds from the start of the source.
    fn position(&self) -> f64;
    /// Engine-reported duration in seconds, once known and positive.
    fn duration(&self) -> Option<f64>;
    /// Stop and release the underlying resources. Idempotent.
    fn unload(&self);
}

/// Creates engine instances. Creation immediately begins the asynchronous
/// load (fetch + decode); completion arrives as [`EngineEvent::Loaded`] or
/// [`EngineEvent::LoadFailed`] on `events`.
pub trait EngineFactory: Send + Sync {
    fn create(
        &self,
        spec: EngineSpec,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Box<dyn AudioEngine>;
}

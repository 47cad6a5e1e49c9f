//! Scoped per-chapter player
//!
//! One per chapter-in-view, owning one engine bridge. Construction starts
//! resolving and loading immediately and never blocks; load failures are
//! logged and leave the player in `pending`, with `set_src` as the retry
//! path. Dropping the player releases its engine.

use tracing::error;

use fable_common::{PlaybackStatus, PlaybackView};

use crate::bridge::{BridgeOptions, EngineBridge, PlaybackObserver, SourceSpec};
use crate::context::PlayerContext;

/// Construction data for a scoped player.
#[derive(Debug, Clone)]
pub struct PlayerSource {
    pub src: String,
    /// Catalog-declared duration in seconds
    pub duration: f64,
    pub format: Option<Vec<String>>,
}

pub struct Player {
    bridge: EngineBridge,
}

impl Player {
    pub fn new(ctx: &PlayerContext, source: PlayerSource) -> Self {
        let bridge = EngineBridge::new(
            ctx,
            BridgeOptions {
                autoplay: false,
                loaded_is_paused: false,
            },
            SourceSpec {
                src: source.src,
                fallback_duration: source.duration,
                format: source.format,
                start_at: None,
            },
        );
        Self { bridge }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.bridge.view().status
    }

    pub fn duration(&self) -> f64 {
        self.bridge.view().duration
    }

    pub fn current_time(&self) -> f64 {
        self.bridge.view().current_time
    }

    pub fn is_initializing(&self) -> bool {
        self.bridge.view().is_initializing
    }

    pub fn view(&self) -> PlaybackView {
        self.bridge.view()
    }

    /// No-op before the load completes.
    pub fn play(&self) {
        self.bridge.play();
    }

    /// No-op before the load completes.
    pub fn pause(&self) {
        self.bridge.pause();
    }

    /// Buffered and applied on load completion when issued early.
    pub fn seek(&self, seconds: f64) {
        self.bridge.seek(seconds);
    }

    /// Switch sources. Errors are caught here and logged; the player stays
    /// usable and a later `set_src` can retry.
    pub async fn set_src(&self, src: impl Into<String>, format: Option<Vec<String>>) {
        if let Err(e) = self.bridge.set_src(src, format).await {
            error!(error = %e, "Failed to initialize audio");
        }
    }

    pub fn subscribe(&self) -> PlaybackObserver {
        self.bridge.subscribe()
    }
}

//! Shared construction context for players
//!
//! Everything a player needs to come to life: resolver, engine factory,
//! snapshot store, and configuration. Explicitly constructed and passed
//! down; there are no module-level globals, so tests can build as many
//! isolated contexts as they like.

use std::sync::Arc;

use fable_common::PlayerConfig;

use crate::engine::{EngineFactory, RodioEngineFactory};
use crate::persist::{JsonFileStore, SnapshotStore};
use crate::resolver::UrlResolver;

#[derive(Clone)]
pub struct PlayerContext {
    pub config: Arc<PlayerConfig>,
    pub resolver: Arc<UrlResolver>,
    pub engine_factory: Arc<dyn EngineFactory>,
    pub snapshot_store: Arc<dyn SnapshotStore>,
}

impl PlayerContext {
    /// Production wiring: rodio engine, JSON-file snapshot store.
    pub fn new(config: PlayerConfig) -> Self {
        let resolver = Arc::new(UrlResolver::new(config.api_base.clone()));
        let snapshot_store = Arc::new(JsonFileStore::new(config.snapshot_path.clone()));
        Self {
            config: Arc::new(config),
            resolver,
            engine_factory: Arc::new(RodioEngineFactory),
            snapshot_store,
        }
    }

    /// Custom wiring, used by tests to inject fakes.
    pub fn with_parts(
        config: PlayerConfig,
        resolver: Arc<UrlResolver>,
        engine_factory: Arc<dyn EngineFactory>,
        snapshot_store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            engine_factory,
            snapshot_store,
        }
    }
}

//! Engine bridge: observable state over an imperative audio engine
//!
//! The engine only speaks through one-shot callbacks and point queries; the
//! bridge turns that into a watch channel the UI can await. Progress while
//! playing is synthesized by a tick task that exists only while someone is
//! observing (explicit reference count, RAII guards) and publishes nothing
//! unless playback is actually advancing.
//!
//! Loads are guarded by a generation counter: `set_src` (and bridge
//! teardown) bump it, and any still-in-flight resolution, engine install,
//! or engine event from a superseded load compares generations and is
//! discarded. Within one bridge at most one load is ever honored at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, warn};

use fable_common::{PlaybackStatus, PlaybackView, Result};

use crate::context::PlayerContext;
use crate::engine::{AudioEngine, EngineEvent, EngineFactory, EngineSpec, SoundHandle};
use crate::resolver::UrlResolver;

/// How a bridge starts and how it reports "loaded but never played".
#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions {
    /// Play as soon as the load completes
    pub autoplay: bool,
    /// Report `paused` for any loaded handle (global-player policy);
    /// otherwise a loaded handle that has never played reports `pending`
    pub loaded_is_paused: bool,
}

/// What the bridge should load.
#[derive(Debug, Clone)]
pub struct SourceSpec {
    /// Opaque storage path or direct URL
    pub src: String,
    /// Catalog-declared duration in seconds, the fallback until the engine
    /// knows better
    pub fallback_duration: f64,
    pub format: Option<Vec<String>>,
    /// Position to apply once the load completes (restore / deep-link)
    pub start_at: Option<f64>,
}

/// Mutable per-source state. `handle` is set only by a successful load
/// callback; a pending load never reports `playing`.
struct Session {
    src: String,
    format: Option<Vec<String>>,
    source_url: Option<String>,
    handle: Option<SoundHandle>,
    is_initializing: bool,
    fallback_duration: f64,
    /// Buffered seek, applied exactly once when the load completes
    pending_seek: Option<f64>,
    has_played: bool,
}

struct BridgeInner {
    resolver: Arc<UrlResolver>,
    factory: Arc<dyn EngineFactory>,
    options: BridgeOptions,
    tick_interval: Duration,
    session: Mutex<Session>,
    engine: Mutex<Option<Box<dyn AudioEngine>>>,
    generation: AtomicU64,
    observers: AtomicUsize,
    tick_active: AtomicBool,
    tick_stop: Notify,
    view_tx: watch::Sender<PlaybackView>,
}

/// Reactive adapter over one audio-engine instance. Single owner; dropping
/// the bridge unloads the engine and invalidates in-flight loads.
pub struct EngineBridge {
    inner: Arc<BridgeInner>,
}

impl EngineBridge {
    pub fn new(ctx: &PlayerContext, options: BridgeOptions, source: SourceSpec) -> Self {
        let (view_tx, _) = watch::channel(PlaybackView::default());
        let inner = Arc::new(BridgeInner {
            resolver: Arc::clone(&ctx.resolver),
            factory: Arc::clone(&ctx.engine_factory),
            options,
            tick_interval: ctx.config.tick_interval(),
            session: Mutex::new(Session {
                src: source.src,
                format: source.format,
                source_url: None,
                handle: None,
                is_initializing: false,
                fallback_duration: source.fallback_duration,
                pending_seek: source.start_at,
                has_played: false,
            }),
            engine: Mutex::new(None),
            generation: AtomicU64::new(0),
            observers: AtomicUsize::new(0),
            tick_active: AtomicBool::new(false),
            tick_stop: Notify::new(),
            view_tx,
        });

        // Begin resolving and loading immediately; construction never
        // blocks, and failures leave the bridge in `pending`.
        let generation = inner.begin_load();
        let task_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            if let Err(e) = BridgeInner::load(Arc::clone(&task_inner), generation).await {
                error!(error = %e, "Failed to initialize audio");
                task_inner.load_settled(generation);
            }
        });

        Self { inner }
    }

    /// Snapshot of the observable surface, computed from live engine state.
    pub fn view(&self) -> PlaybackView {
        self.inner.view()
    }

    pub fn has_handle(&self) -> bool {
        self.inner.lock_session().handle.is_some()
    }

    /// No-op until a handle exists.
    pub fn play(&self) {
        {
            let mut session = self.inner.lock_session();
            if session.handle.is_none() {
                return;
            }
            let engine = self.inner.engine.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(engine) = engine.as_ref() {
                engine.play();
                // Adopt the engine's duration once it has a real one.
                if let Some(d) = engine.duration().filter(|d| *d > 0.0) {
                    session.fallback_duration = d;
                }
            }
        }
        self.inner.publish();
    }

    /// No-op until a handle exists.
    pub fn pause(&self) {
        {
            let session = self.inner.lock_session();
            if session.handle.is_none() {
                return;
            }
            let engine = self.inner.engine.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(engine) = engine.as_ref() {
                engine.pause();
            }
        }
        self.inner.publish();
    }

    /// Reposition without changing play/pause state. Before the handle
    /// exists the position is buffered and applied once on load completion.
    pub fn seek(&self, seconds: f64) {
        {
            let mut session = self.inner.lock_session();
            if session.handle.is_some() {
                let engine = self.inner.engine.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(engine) = engine.as_ref() {
                    engine.seek(seconds);
                }
            } else {
                session.pending_seek = Some(seconds);
            }
        }
        self.inner.publish();
    }

    /// Switch to a new source. Idempotent no-op when both the path and the
    /// format hints are unchanged; any field change unloads the current
    /// engine and restarts the load sequence.
    pub async fn set_src(&self, src: impl Into<String>, format: Option<Vec<String>>) -> Result<()> {
        let src = src.into();
        {
            let mut session = self.inner.lock_session();
            if session.src == src && session.format == format {
                return Ok(());
            }
            session.src = src;
            session.format = format;
            session.source_url = None;
            session.handle = None;
            session.pending_seek = None;
            session.has_played = false;
        }

        let generation = self.inner.begin_load();
        self.inner.drop_engine();
        self.inner.publish();

        let result = BridgeInner::load(Arc::clone(&self.inner), generation).await;
        if result.is_err() {
            self.inner.load_settled(generation);
        }
        result
    }

    /// Subscribe to the observable surface. The returned observer keeps the
    /// progress tick alive; dropping the last observer tears it down.
    pub fn subscribe(&self) -> PlaybackObserver {
        PlaybackObserver {
            rx: self.inner.view_tx.subscribe(),
            _guard: ObserverGuard::register(Arc::clone(&self.inner)),
        }
    }
}

impl Drop for EngineBridge {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl BridgeInner {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Start a new load generation, superseding any in-flight one.
    fn begin_load(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock_session().is_initializing = true;
        generation
    }

    /// Clear the initializing flag if `generation` still owns the session.
    fn load_settled(&self, generation: u64) {
        if self.is_current(generation) {
            self.lock_session().is_initializing = false;
            self.publish();
        }
    }

    fn drop_engine(&self) {
        let engine = self
            .engine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(engine) = engine {
            engine.unload();
        }
    }

    /// Resolve the source and bring up a new engine instance. Superseded
    /// completions are discarded, never applied.
    async fn load(inner: Arc<Self>, generation: u64) -> Result<()> {
        let (src, format) = {
            let session = inner.lock_session();
            (session.src.clone(), session.format.clone())
        };
        inner.publish();

        let url = inner.resolver.resolve(&src).await?;
        if !inner.is_current(generation) {
            debug!(%src, "Discarding superseded resolution");
            return Ok(());
        }
        inner.lock_session().source_url = Some(url.clone());

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let engine = inner.factory.create(
            EngineSpec {
                url,
                format,
                autoplay: inner.options.autoplay,
            },
            event_tx,
        );

        {
            let mut slot = inner.engine.lock().unwrap_or_else(|e| e.into_inner());
            if !inner.is_current(generation) {
                engine.unload();
                return Ok(());
            }
            *slot = Some(engine);
        }
        inner.load_settled(generation);

        // Engines that complete synchronously have already queued their
        // callbacks; apply them now so the handle is visible to the caller
        // the moment this load returns.
        while let Ok(event) = event_rx.try_recv() {
            if !inner.is_current(generation) || !inner.apply_event(event) {
                return Ok(());
            }
        }

        tokio::spawn(Self::pump_events(inner, generation, event_rx));
        Ok(())
    }

    /// Apply one engine callback to the session. Returns false once the
    /// engine is gone and no further events should be consumed.
    fn apply_event(&self, event: EngineEvent) -> bool {
        let keep_pumping = match event {
            EngineEvent::Loaded { handle, duration } => {
                let pending = {
                    let mut session = self.lock_session();
                    session.handle = Some(handle);
                    if let Some(d) = duration.filter(|d| *d > 0.0) {
                        session.fallback_duration = d;
                    }
                    session.pending_seek.take()
                };
                if let Some(seconds) = pending {
                    let engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
                    if let Some(engine) = engine.as_ref() {
                        engine.seek(seconds);
                    }
                }
                debug!(?handle, ?duration, "Audio loaded");
                true
            }
            EngineEvent::LoadFailed { message } => {
                // Non-fatal: the bridge stays usable in `pending` and a
                // later set_src can retry.
                warn!(%message, "Engine failed to load audio");
                {
                    let mut session = self.lock_session();
                    session.handle = None;
                    session.is_initializing = false;
                }
                self.drop_engine();
                false
            }
            EngineEvent::Played => {
                self.lock_session().has_played = true;
                true
            }
            EngineEvent::Paused | EngineEvent::Ended | EngineEvent::Seeked => true,
        };
        self.publish();
        keep_pumping
    }

    /// Apply engine callbacks to the session for as long as this load
    /// generation is current.
    async fn pump_events(
        inner: Arc<Self>,
        generation: u64,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if !inner.is_current(generation) || !inner.apply_event(event) {
                break;
            }
        }
    }

    fn view(&self) -> PlaybackView {
        let session = self.lock_session();
        let engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
        match (engine.as_ref(), session.handle) {
            (Some(engine), Some(_)) => {
                let playing = engine.is_playing();
                let status = if playing {
                    PlaybackStatus::Playing
                } else if self.options.loaded_is_paused || session.has_played {
                    PlaybackStatus::Paused
                } else {
                    PlaybackStatus::Pending
                };
                let duration = engine
                    .duration()
                    .filter(|d| *d > 0.0)
                    .unwrap_or(session.fallback_duration);
                PlaybackView {
                    status,
                    duration,
                    current_time: engine.position(),
                    is_initializing: session.is_initializing,
                }
            }
            _ => PlaybackView {
                status: PlaybackStatus::Pending,
                duration: session.fallback_duration,
                current_time: session.pending_seek.unwrap_or(0.0),
                is_initializing: session.is_initializing,
            },
        }
    }

    /// Publish the current view if it changed. Observers only wake on
    /// actual changes.
    fn publish(&self) {
        let view = self.view();
        self.view_tx.send_if_modified(|current| {
            if *current != view {
                *current = view;
                true
            } else {
                false
            }
        });
    }

    fn start_tick(self: &Arc<Self>) {
        if self.tick_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if inner.observers.load(Ordering::SeqCst) == 0 {
                            break;
                        }
                        // Publishing is gated on active playback so a
                        // paused player never wakes its observers.
                        if inner.view().status.is_playing() {
                            inner.publish();
                        }
                    }
                    _ = inner.tick_stop.notified() => break,
                }
            }
            inner.tick_active.store(false, Ordering::SeqCst);
            // An observer may have arrived while this task was winding down.
            if inner.observers.load(Ordering::SeqCst) > 0 {
                inner.start_tick();
            }
        });
    }

    fn teardown(&self) {
        // Invalidate in-flight loads and stale event pumps first.
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.drop_engine();
        {
            let mut session = self.lock_session();
            session.handle = None;
            session.source_url = None;
            session.is_initializing = false;
        }
        self.tick_stop.notify_waiters();
        self.publish();
    }
}

/// Keeps the progress tick alive while held. Created per observer.
struct ObserverGuard {
    inner: Arc<BridgeInner>,
}

impl ObserverGuard {
    fn register(inner: Arc<BridgeInner>) -> Self {
        if inner.observers.fetch_add(1, Ordering::SeqCst) == 0 {
            inner.start_tick();
        }
        Self { inner }
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if self.inner.observers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.tick_stop.notify_waiters();
        }
    }
}

/// Handle onto the observable surface of one bridge.
pub struct PlaybackObserver {
    rx: watch::Receiver<PlaybackView>,
    _guard: ObserverGuard,
}

impl PlaybackObserver {
    /// Wait for the next published change and return it.
    pub async fn changed(&mut self) -> PlaybackView {
        // The sender lives as long as the guard's Arc, so this cannot fail
        // while the observer exists.
        let _ = self.rx.changed().await;
        *self.rx.borrow_and_update()
    }

    /// Latest view without waiting.
    pub fn latest(&mut self) -> PlaybackView {
        *self.rx.borrow_and_update()
    }
}

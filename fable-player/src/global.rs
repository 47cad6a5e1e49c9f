//! Process-wide player
//!
//! Owns at most one engine bridge at a time, tracks which book/chapter is
//! "now playing", and persists its position so a full restart resumes where
//! the listener left off. Explicitly constructed from a [`PlayerContext`]
//! and passed down; nothing here is a module-level global.
//!
//! Persistence cadence: every mutating call (`play`, `pause`, `stop`,
//! `seek`, `play_chapter`) writes the snapshot synchronously best-effort,
//! and a background interval re-writes it while playback is active as a
//! safety net against abrupt shutdown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fable_common::{Chapter, PlaybackStatus, PlaybackView};

use crate::bridge::{BridgeOptions, EngineBridge, SourceSpec};
use crate::context::PlayerContext;
use crate::persist::PlaybackSnapshot;

#[derive(Default)]
struct GlobalState {
    bridge: Option<EngineBridge>,
    current_book_id: Option<String>,
    current_chapter_id: Option<String>,
    current_chapter: Option<Chapter>,
    /// Restored (position, duration) not yet confirmed by a loaded engine
    pending_restore: Option<(f64, f64)>,
}

struct GlobalInner {
    ctx: PlayerContext,
    state: Mutex<GlobalState>,
    view_tx: watch::Sender<PlaybackView>,
    global_observers: AtomicUsize,
    forward_active: AtomicBool,
    forward_stop: Notify,
    bridge_changed: Notify,
}

/// Cross-navigation audio player. Create once per process, share by
/// reference (or keep it in your app context).
pub struct GlobalPlayer {
    inner: Arc<GlobalInner>,
    persist_task: JoinHandle<()>,
}

impl GlobalPlayer {
    /// Construct the player and attempt a snapshot restore. A restore
    /// hydrates identity and position and lazily starts a non-autoplaying
    /// load; it never produces audible playback on its own.
    pub fn new(ctx: PlayerContext) -> Self {
        let (view_tx, _) = watch::channel(PlaybackView::default());
        let inner = Arc::new(GlobalInner {
            ctx,
            state: Mutex::new(GlobalState::default()),
            view_tx,
            global_observers: AtomicUsize::new(0),
            forward_active: AtomicBool::new(false),
            forward_stop: Notify::new(),
            bridge_changed: Notify::new(),
        });

        if let Some(snapshot) = inner.ctx.snapshot_store.load() {
            if snapshot.is_restorable() {
                inner.hydrate(snapshot);
            }
        }

        let task_inner = Arc::clone(&inner);
        let period = inner.ctx.config.persist_interval();
        let persist_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if task_inner.view().status.is_playing() {
                    task_inner.persist();
                }
            }
        });

        Self {
            inner,
            persist_task,
        }
    }

    /// Play a chapter's audio. Requesting the chapter that is already
    /// loaded resumes in place without touching the engine; anything else
    /// tears the current engine down first, then starts an autoplaying
    /// load of the new source.
    pub fn play_chapter(&self, book_id: &str, chapter: &Chapter, start_time: Option<f64>) {
        let resume = {
            let state = self.inner.lock_state();
            state.current_book_id.as_deref() == Some(book_id)
                && state.current_chapter_id.as_deref() == Some(chapter.id.as_str())
                && state.bridge.as_ref().map(|b| b.has_handle()).unwrap_or(false)
        };
        if resume {
            {
                let state = self.inner.lock_state();
                if let Some(bridge) = &state.bridge {
                    if !bridge.view().status.is_playing() {
                        bridge.play();
                    }
                }
            }
            self.inner.persist();
            self.inner.publish();
            return;
        }

        let old = {
            let mut state = self.inner.lock_state();
            let old = state.bridge.take();
            state.current_book_id = Some(book_id.to_string());
            state.current_chapter_id = Some(chapter.id.clone());
            state.current_chapter = Some(chapter.clone());
            state.pending_restore = None;
            old
        };
        // Old engine teardown is initiated before the new load begins, so
        // at most one decoding engine is ever alive.
        drop(old);

        if chapter.audio_source.is_empty() {
            warn!(book_id, chapter_id = %chapter.id, "No audio source provided");
            self.inner.publish();
            return;
        }

        let bridge = EngineBridge::new(
            &self.inner.ctx,
            BridgeOptions {
                autoplay: true,
                loaded_is_paused: true,
            },
            SourceSpec {
                src: chapter.audio_source.clone(),
                fallback_duration: chapter.duration,
                format: chapter.format.clone(),
                start_at: start_time,
            },
        );
        self.inner.lock_state().bridge = Some(bridge);
        self.inner.bridge_changed.notify_one();
        self.inner.persist();
        self.inner.publish();
    }

    pub fn play(&self) {
        {
            let state = self.inner.lock_state();
            if let Some(bridge) = &state.bridge {
                bridge.play();
            }
        }
        self.inner.persist();
        self.inner.publish();
    }

    pub fn pause(&self) {
        {
            let state = self.inner.lock_state();
            if let Some(bridge) = &state.bridge {
                bridge.pause();
            }
        }
        self.inner.persist();
        self.inner.publish();
    }

    /// Unload the engine entirely; identity and position are kept so the
    /// persisted snapshot still resumes where the listener stopped.
    pub fn stop(&self) {
        let old = {
            let mut state = self.inner.lock_state();
            if state.bridge.is_some() {
                let view = GlobalInner::view_locked(&state);
                state.pending_restore = Some((view.current_time, view.duration));
            }
            state.bridge.take()
        };
        drop(old);
        self.inner.bridge_changed.notify_one();
        self.inner.persist();
        self.inner.publish();
    }

    pub fn seek(&self, seconds: f64) {
        {
            let mut state = self.inner.lock_state();
            if let Some(restore) = &mut state.pending_restore {
                restore.0 = seconds;
            }
            if let Some(bridge) = &state.bridge {
                bridge.seek(seconds);
            }
        }
        self.inner.persist();
        self.inner.publish();
    }

    pub fn status(&self) -> PlaybackStatus {
        self.inner.view().status
    }

    pub fn duration(&self) -> f64 {
        self.inner.view().duration
    }

    pub fn current_time(&self) -> f64 {
        self.inner.view().current_time
    }

    pub fn is_initializing(&self) -> bool {
        self.inner.view().is_initializing
    }

    pub fn is_playing(&self) -> bool {
        self.status().is_playing()
    }

    pub fn view(&self) -> PlaybackView {
        self.inner.view()
    }

    pub fn current_book_id(&self) -> Option<String> {
        self.inner.lock_state().current_book_id.clone()
    }

    pub fn current_chapter_id(&self) -> Option<String> {
        self.inner.lock_state().current_chapter_id.clone()
    }

    pub fn current_chapter(&self) -> Option<Chapter> {
        self.inner.lock_state().current_chapter.clone()
    }

    /// Identity match plus `playing` status, for UI highlighting.
    pub fn is_chapter_playing(&self, book_id: &str, chapter_id: &str) -> bool {
        let state = self.inner.lock_state();
        state.current_book_id.as_deref() == Some(book_id)
            && state.current_chapter_id.as_deref() == Some(chapter_id)
            && GlobalInner::view_locked(&state).status.is_playing()
    }

    /// Subscribe to the observable surface. The channel is stable across
    /// chapter switches; forwarding from the underlying bridge only runs
    /// while at least one observer is attached.
    pub fn subscribe(&self) -> GlobalObserver {
        GlobalObserver {
            rx: self.inner.view_tx.subscribe(),
            _guard: GlobalObserverGuard::register(Arc::clone(&self.inner)),
        }
    }
}

impl Drop for GlobalPlayer {
    fn drop(&mut self) {
        self.persist_task.abort();
        self.inner.forward_stop.notify_one();
        // Release the engine promptly rather than waiting out task Arcs.
        let old = self.inner.lock_state().bridge.take();
        drop(old);
    }
}

impl GlobalInner {
    fn lock_state(&self) -> MutexGuard<'_, GlobalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hydrate identity and position from a snapshot and lazily start a
    /// non-autoplaying load so the UI can show "paused, ready to resume".
    fn hydrate(&self, snapshot: PlaybackSnapshot) {
        let src = snapshot
            .audio_source
            .clone()
            .or_else(|| {
                snapshot
                    .current_chapter
                    .as_ref()
                    .map(|c| c.audio_source.clone())
            })
            .filter(|s| !s.is_empty());

        info!(
            book_id = snapshot.current_book_id.as_deref().unwrap_or(""),
            chapter_id = snapshot.current_chapter_id.as_deref().unwrap_or(""),
            position = snapshot.current_time,
            "Restoring playback snapshot"
        );

        let mut state = self.lock_state();
        state.current_book_id = snapshot.current_book_id;
        state.current_chapter_id = snapshot.current_chapter_id;
        state.pending_restore = Some((snapshot.current_time, snapshot.duration));

        if let Some(src) = src {
            let format = snapshot
                .current_chapter
                .as_ref()
                .and_then(|c| c.format.clone());
            let bridge = EngineBridge::new(
                &self.ctx,
                BridgeOptions {
                    autoplay: false,
                    loaded_is_paused: true,
                },
                SourceSpec {
                    src,
                    fallback_duration: snapshot.duration,
                    format,
                    start_at: Some(snapshot.current_time),
                },
            );
            state.bridge = Some(bridge);
        }
        state.current_chapter = snapshot.current_chapter;
        drop(state);

        self.bridge_changed.notify_one();
        self.publish();
    }

    fn view_locked(state: &GlobalState) -> PlaybackView {
        let mut view = state
            .bridge
            .as_ref()
            .map(|b| b.view())
            .unwrap_or_default();
        if view.status == PlaybackStatus::Pending {
            if let Some((position, duration)) = state.pending_restore {
                view.current_time = position;
                if view.duration <= 0.0 {
                    view.duration = duration;
                }
            }
        }
        view
    }

    fn view(&self) -> PlaybackView {
        Self::view_locked(&self.lock_state())
    }

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

    /// Best-effort snapshot write; storage failures are logged and
    /// swallowed, never surfaced to the caller.
    fn persist(&self) {
        let snapshot = {
            let state = self.lock_state();
            let (Some(book_id), Some(chapter_id)) = (
                state.current_book_id.clone(),
                state.current_chapter_id.clone(),
            ) else {
                return;
            };
            let view = Self::view_locked(&state);
            PlaybackSnapshot {
                current_book_id: Some(book_id),
                current_chapter_id: Some(chapter_id),
                current_chapter: state.current_chapter.clone(),
                current_time: view.current_time,
                duration: view.duration,
                audio_source: state
                    .current_chapter
                    .as_ref()
                    .map(|c| c.audio_source.clone()),
                saved_at: Utc::now(),
            }
        };
        if let Err(e) = self.ctx.snapshot_store.save(&snapshot) {
            warn!(error = %e, "Failed to persist playback snapshot");
        }
    }

    /// Forward bridge changes into the stable global watch channel while
    /// observers exist, re-attaching whenever the bridge is replaced.
    fn start_forward(self: &Arc<Self>) {
        if self.forward_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            'attach: loop {
                if inner.global_observers.load(Ordering::SeqCst) == 0 {
                    break;
                }
                let observer = {
                    let state = inner.lock_state();
                    state.bridge.as_ref().map(|b| b.subscribe())
                };
                match observer {
                    None => {
                        tokio::select! {
                            _ = inner.bridge_changed.notified() => {}
                            _ = inner.forward_stop.notified() => break 'attach,
                        }
                    }
                    Some(mut observer) => loop {
                        tokio::select! {
                            _ = observer.changed() => inner.publish(),
                            _ = inner.bridge_changed.notified() => continue 'attach,
                            _ = inner.forward_stop.notified() => break 'attach,
                        }
                    },
                }
            }
            inner.forward_active.store(false, Ordering::SeqCst);
            if inner.global_observers.load(Ordering::SeqCst) > 0 {
                inner.start_forward();
            }
        });
    }
}

struct GlobalObserverGuard {
    inner: Arc<GlobalInner>,
}

impl GlobalObserverGuard {
    fn register(inner: Arc<GlobalInner>) -> Self {
        if inner.global_observers.fetch_add(1, Ordering::SeqCst) == 0 {
            inner.start_forward();
        }
        Self { inner }
    }
}

impl Drop for GlobalObserverGuard {
    fn drop(&mut self) {
        if self.inner.global_observers.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.forward_stop.notify_one();
        }
    }
}

/// Handle onto the global player's observable surface.
pub struct GlobalObserver {
    rx: watch::Receiver<PlaybackView>,
    _guard: GlobalObserverGuard,
}

impl GlobalObserver {
    /// Wait for the next published change and return it.
    pub async fn changed(&mut self) -> PlaybackView {
        let _ = self.rx.changed().await;
        *self.rx.borrow_and_update()
    }

    /// Latest view without waiting.
    pub fn latest(&mut self) -> PlaybackView {
        *self.rx.borrow_and_update()
    }
}

//! Default audio engine backed by rodio
//!
//! rodio's `OutputStream` is not `Send`, so each engine instance runs a
//! dedicated thread that owns the output stream and sink, takes commands
//! over a channel, and mirrors position/playing state into atomics for
//! cheap cross-thread queries. The source bytes are fetched up front
//! (blocking reqwest for http(s), filesystem otherwise) and kept around so
//! play-after-end can rebuild the decoder from the start.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, OutputStream, Sink, Source};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{AudioEngine, EngineEvent, EngineFactory, EngineSpec, SoundHandle};

/// How often the engine thread refreshes the mirrored position and checks
/// for end-of-track while idle between commands.
const POLL_PERIOD: Duration = Duration::from_millis(50);

enum Command {
    Play,
    Pause,
    Seek(f64),
    Unload,
}

/// State mirrored out of the engine thread for lock-free queries.
#[derive(Default)]
struct Mirror {
    playing: AtomicBool,
    position_ms: AtomicU64,
    /// 0 = unknown
    duration_ms: AtomicU64,
}

pub struct RodioEngine {
    cmd_tx: Mutex<Sender<Command>>,
    mirror: Arc<Mirror>,
}

impl RodioEngine {
    fn spawn(spec: EngineSpec, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        let mirror = Arc::new(Mirror::default());
        let thread_mirror = Arc::clone(&mirror);
        std::thread::Builder::new()
            .name("fable-audio".into())
            .spawn(move || run_engine(spec, cmd_rx, events, thread_mirror))
            .ok();
        Self {
            cmd_tx: Mutex::new(cmd_tx),
            mirror,
        }
    }

    fn send(&self, command: Command) {
        // A dead engine thread means the sound is already unloaded.
        if let Ok(tx) = self.cmd_tx.lock() {
            let _ = tx.send(command);
        }
    }
}

impl AudioEngine for RodioEngine {
    fn play(&self) {
        self.send(Command::Play);
    }

    fn pause(&self) {
        self.send(Command::Pause);
    }

    fn seek(&self, seconds: f64) {
        self.send(Command::Seek(seconds.max(0.0)));
    }

    fn is_playing(&self) -> bool {
        self.mirror.playing.load(Ordering::Relaxed)
    }

    fn position(&self) -> f64 {
        self.mirror.position_ms.load(Ordering::Relaxed) as f64 / 1000.0
    }

    fn duration(&self) -> Option<f64> {
        match self.mirror.duration_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms as f64 / 1000.0),
        }
    }

    fn unload(&self) {
        self.send(Command::Unload);
    }
}

/// Factory for the rodio-backed engine.
#[derive(Debug, Default, Clone)]
pub struct RodioEngineFactory;

impl EngineFactory for RodioEngineFactory {
    fn create(
        &self,
        spec: EngineSpec,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Box<dyn AudioEngine> {
        Box::new(RodioEngine::spawn(spec, events))
    }
}

fn run_engine(
    spec: EngineSpec,
    cmd_rx: std::sync::mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<EngineEvent>,
    mirror: Arc<Mirror>,
) {
    let bytes = match fetch_source(&spec.url) {
        Ok(bytes) => Arc::new(bytes),
        Err(message) => {
            let _ = events.send(EngineEvent::LoadFailed { message });
            return;
        }
    };

    // The output stream must stay alive on this thread for audio to flow.
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = events.send(EngineEvent::LoadFailed {
                message: format!("audio output unavailable: {e}"),
            });
            return;
        }
    };
    let sink = match Sink::try_new(&handle) {
        Ok(sink) => sink,
        Err(e) => {
            let _ = events.send(EngineEvent::LoadFailed {
                message: format!("audio sink unavailable: {e}"),
            });
            return;
        }
    };

    let duration = match append_decoded(&sink, &bytes) {
        Ok(duration) => duration,
        Err(message) => {
            let _ = events.send(EngineEvent::LoadFailed { message });
            return;
        }
    };
    if let Some(d) = duration {
        mirror
            .duration_ms
            .store((d * 1000.0) as u64, Ordering::Relaxed);
    }

    let sound = SoundHandle::next();
    debug!(url = %spec.url, ?duration, "Audio source loaded");
    let _ = events.send(EngineEvent::Loaded {
        handle: sound,
        duration,
    });

    if spec.autoplay {
        sink.play();
        mirror.playing.store(true, Ordering::Relaxed);
        let _ = events.send(EngineEvent::Played);
    } else {
        sink.pause();
    }

    loop {
        match cmd_rx.recv_timeout(POLL_PERIOD) {
            Ok(Command::Play) => {
                if sink.empty() {
                    // Play after end restarts from the top.
                    if let Err(message) = append_decoded(&sink, &bytes) {
                        warn!(%message, "Failed to restart audio source");
                        continue;
                    }
                }
                sink.play();
                mirror.playing.store(true, Ordering::Relaxed);
                let _ = events.send(EngineEvent::Played);
            }
            Ok(Command::Pause) => {
                sink.pause();
                mirror.playing.store(false, Ordering::Relaxed);
                let _ = events.send(EngineEvent::Paused);
            }
            Ok(Command::Seek(seconds)) => {
                if sink.empty() {
                    if let Err(message) = append_decoded(&sink, &bytes) {
                        warn!(%message, "Failed to reload audio source for seek");
                        continue;
                    }
                    // Repositioning must not change the play/pause state.
                    if !mirror.playing.load(Ordering::Relaxed) {
                        sink.pause();
                    }
                }
                if let Err(e) = sink.try_seek(Duration::from_secs_f64(seconds)) {
                    warn!(seconds, error = %e, "Seek not supported for this source");
                } else {
                    mirror
                        .position_ms
                        .store((seconds * 1000.0) as u64, Ordering::Relaxed);
                    let _ = events.send(EngineEvent::Seeked);
                }
            }
            Ok(Command::Unload) | Err(RecvTimeoutError::Disconnected) => {
                sink.stop();
                mirror.playing.store(false, Ordering::Relaxed);
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                mirror
                    .position_ms
                    .store(sink.get_pos().as_millis() as u64, Ordering::Relaxed);
                if mirror.playing.load(Ordering::Relaxed) && sink.empty() {
                    mirror.playing.store(false, Ordering::Relaxed);
                    let _ = events.send(EngineEvent::Ended);
                }
            }
        }
    }
}

/// Decode the cached bytes and append to the sink; returns the decoder's
/// total duration when the container reports one.
fn append_decoded(sink: &Sink, bytes: &Arc<Vec<u8>>) -> Result<Option<f64>, String> {
    let cursor = Cursor::new(Vec::clone(bytes));
    let source = Decoder::new(cursor).map_err(|e| format!("decode failed: {e}"))?;
    let duration = source.total_duration().map(|d| d.as_secs_f64());
    sink.append(source);
    Ok(duration)
}

/// Fetch the full source into memory. http(s) goes over the network;
/// `file://` and bare paths come from disk.
fn fetch_source(url: &str) -> Result<Vec<u8>, String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        let response = reqwest::blocking::get(url).map_err(|e| format!("fetch failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!("fetch failed: status {}", response.status()));
        }
        let bytes = response.bytes().map_err(|e| format!("fetch failed: {e}"))?;
        Ok(bytes.to_vec())
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path).map_err(|e| format!("cannot read {path}: {e}"))
    }
}

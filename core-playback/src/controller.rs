//! # Playback Controller
//!
//! Single source of truth for transport state and position of a chunked
//! stream.
//!
//! ## Overview
//!
//! A track is delivered as fixed-interval chunks that may not exist locally
//! yet. `play()` and `seek()` therefore do two things:
//!
//! 1. Resolve the position to a chunk, update state, and emit a request event
//!    so an external loader can fetch the chunk (and its neighbours).
//! 2. Poll the chunk registry every `poll_interval` until the chunk is loaded,
//!    the loader reports a failure, or the adaptive timeout elapses.
//!
//! The controller itself never performs I/O. Loaders report back through
//! [`update_chunk_load_state`](PlaybackController::update_chunk_load_state),
//! [`set_chunk_audio_buffer`](PlaybackController::set_chunk_audio_buffer) and
//! [`report_chunk_failure`](PlaybackController::report_chunk_failure).
//!
//! ## Request Epochs
//!
//! Every `play()`/`seek()` takes a new epoch. A wait whose epoch has been
//! superseded (by a newer request, a new track, `stop()` or `destroy()`)
//! returns [`RequestOutcome::Superseded`] at its next poll without touching
//! state or the latency history.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_playback::{PlaybackController, StreamMetadata};
//!
//! # async fn run() -> core_playback::Result<()> {
//! let controller = PlaybackController::new();
//! let meta = StreamMetadata::contiguous(180.0, 10.0);
//! controller.init_chunks(meta.chunk_count());
//! controller.set_metadata(meta)?;
//!
//! let outcome = controller.seek(42.0).await?;
//! println!("chunk {} ready", outcome.chunk_index());
//! # Ok(())
//! # }
//! ```

use crate::chunks::ChunkRegistry;
use crate::config::ControllerConfig;
use crate::error::{PlaybackError, Result};
use crate::events::{AdjacentChunks, ControllerEvent, EventKind};
use crate::timeout::AdaptiveTimeoutManager;
use crate::types::{AudioBuffer, ChunkInfo, PlaybackState, StreamMetadata};
use core_runtime::events::{ListenerId, ListenerRegistry, ListenerResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// How a `play()`/`seek()` wait ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The chunk became loaded for the most recent request.
    Ready { chunk_index: usize, waited: Duration },
    /// A newer request took over before the chunk was ready.
    Superseded { chunk_index: usize },
}

impl RequestOutcome {
    pub fn chunk_index(&self) -> usize {
        match self {
            RequestOutcome::Ready { chunk_index, .. }
            | RequestOutcome::Superseded { chunk_index } => *chunk_index,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RequestOutcome::Ready { .. })
    }
}

enum ChunkPoll {
    Loaded,
    Failed(String),
    Pending,
}

#[derive(Debug, Default)]
struct ControllerState {
    playback: PlaybackState,
    position: f64,
    metadata: Option<StreamMetadata>,
    chunks: ChunkRegistry,
    /// Chunk targeted by the latest play/seek.
    current_chunk: Option<usize>,
}

impl ControllerState {
    fn transition(&mut self, to: PlaybackState, events: &mut Vec<ControllerEvent>) {
        let from = self.playback;
        if from != to {
            self.playback = to;
            events.push(ControllerEvent::StateChanged { from, to });
        }
    }

    fn clamp_position(&self, time: f64) -> f64 {
        match self.metadata {
            Some(meta) => time.max(0.0).min(meta.duration),
            None => time.max(0.0),
        }
    }
}

struct Inner {
    config: ControllerConfig,
    state: Mutex<ControllerState>,
    epoch: AtomicU64,
    destroyed: AtomicBool,
    listeners: ListenerRegistry<EventKind, ControllerEvent>,
    timeouts: Arc<AdaptiveTimeoutManager>,
}

/// Chunked playback state machine.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    /// Create a controller with default configuration.
    pub fn new() -> Self {
        Self::build(ControllerConfig::default())
    }

    /// Create a controller with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Internal` if the configuration is invalid.
    pub fn with_config(config: ControllerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PlaybackError::Internal(format!("Invalid controller config: {}", e)))?;
        Ok(Self::build(config))
    }

    fn build(config: ControllerConfig) -> Self {
        let timeouts = Arc::new(AdaptiveTimeoutManager::new(config.timeout.clone()));
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ControllerState::default()),
                epoch: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
                listeners: ListenerRegistry::new(),
                timeouts,
            }),
        }
    }

    // ========================================================================
    // Track Setup
    // ========================================================================

    /// Allocate `count` fresh chunk records and reset the timeout history.
    ///
    /// This starts a new track: the playhead goes back to 0, the state to
    /// `Idle`, and any in-flight wait is superseded.
    pub fn init_chunks(&self, count: usize) {
        if self.is_destroyed() {
            return;
        }
        self.next_epoch();
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            state.chunks.reset(count);
            state.current_chunk = None;
            state.position = 0.0;
            state.transition(PlaybackState::Idle, &mut events);
        }
        self.inner.timeouts.reset();
        debug!(count, "Chunks initialized");
        self.emit_all(events);
    }

    /// Store track timing. Required before `play()`/`seek()`.
    pub fn set_metadata(&self, metadata: StreamMetadata) -> Result<()> {
        metadata.validate()?;
        if self.is_destroyed() {
            return Err(PlaybackError::NoTrackLoaded);
        }

        let mut state = self.inner.state.lock();
        state.metadata = Some(metadata);
        state.position = state.clamp_position(state.position);
        info!(
            duration = metadata.duration,
            chunk_duration = metadata.chunk_duration,
            chunk_interval = metadata.interval(),
            "Stream metadata set"
        );
        Ok(())
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start playback from the current position.
    ///
    /// Resolves once the target chunk is loaded or a newer request supersedes
    /// this one.
    ///
    /// # Errors
    ///
    /// - `NoTrackLoaded` if no metadata has been set
    /// - `ChunkOutOfRange` if the registry does not hold the target chunk
    /// - `ChunkLoadFailed` if the loader reports a failure for the chunk
    /// - `ChunkLoadTimeout` if the chunk is not loaded within the adaptive
    ///   timeout; the state stays `Playing`
    #[instrument(skip(self))]
    pub async fn play(&self) -> Result<RequestOutcome> {
        let mut events = Vec::new();
        let (epoch, chunk_index) = {
            let mut state = self.inner.state.lock();
            let metadata = state.metadata.ok_or(PlaybackError::NoTrackLoaded)?;
            let target = metadata.locate(state.position);
            check_range(&state.chunks, target.chunk_index)?;

            let epoch = self.next_epoch();
            state.chunks.clear_failure(target.chunk_index);
            state.current_chunk = Some(target.chunk_index);
            state.transition(PlaybackState::Playing, &mut events);

            events.push(ControllerEvent::PlayRequested {
                chunk_index: target.chunk_index,
                offset_in_chunk: target.offset,
                chunk_interval: metadata.interval(),
                chunk_duration: metadata.chunk_duration,
            });
            (epoch, target.chunk_index)
        };

        debug!(chunk_index, epoch, "Play requested");
        self.emit_all(events);
        self.wait_for_chunk(epoch, chunk_index).await
    }

    /// Pause playback. No-op unless the state is `Playing` or `Buffering`.
    pub fn pause(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if !state.playback.is_active() {
                return;
            }
            state.transition(PlaybackState::Paused, &mut events);
            events.push(ControllerEvent::PauseRequested {
                pause_time: state.position,
            });
        }
        self.emit_all(events);
    }

    /// Move the playhead to `time` seconds and wait for its chunk.
    ///
    /// The position is updated immediately, so later requests start from the
    /// newest target. The transport state is left as it was, except that
    /// `Error` becomes `Ready`.
    ///
    /// # Errors
    ///
    /// Same as [`play`](Self::play), plus `InvalidPosition` for a non-finite
    /// `time`.
    #[instrument(skip(self))]
    pub async fn seek(&self, time: f64) -> Result<RequestOutcome> {
        if !time.is_finite() {
            return Err(PlaybackError::InvalidPosition(time));
        }

        let mut events = Vec::new();
        let (epoch, chunk_index) = {
            let mut state = self.inner.state.lock();
            let metadata = state.metadata.ok_or(PlaybackError::NoTrackLoaded)?;
            let target_time = state.clamp_position(time);
            let target = metadata.locate(target_time);
            check_range(&state.chunks, target.chunk_index)?;

            let epoch = self.next_epoch();
            let was_playing = state.playback.is_active();
            state.position = target_time;
            state.chunks.clear_failure(target.chunk_index);
            state.current_chunk = Some(target.chunk_index);
            if state.playback == PlaybackState::Error {
                state.transition(PlaybackState::Ready, &mut events);
            }

            events.push(ControllerEvent::SeekRequested {
                target_time,
                target_chunk: target.chunk_index,
                offset: target.offset,
                chunk_interval: metadata.interval(),
                was_playing,
                adjacent_chunks: AdjacentChunks::around(target.chunk_index, state.chunks.len()),
            });
            (epoch, target.chunk_index)
        };

        debug!(chunk_index, epoch, "Seek requested");
        self.emit_all(events);
        self.wait_for_chunk(epoch, chunk_index).await
    }

    /// Stop playback and rewind to 0. In-flight waits are superseded.
    pub fn stop(&self) {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if state.playback == PlaybackState::Idle && state.position == 0.0 {
                return;
            }
            self.next_epoch();
            state.position = 0.0;
            state.current_chunk = None;
            state.transition(PlaybackState::Idle, &mut events);
            events.push(ControllerEvent::StopRequested);
        }
        self.emit_all(events);
    }

    /// `Playing → Buffering`, when the audio engine runs dry.
    pub fn enter_buffering(&self) -> bool {
        self.swap_state(PlaybackState::Playing, PlaybackState::Buffering)
    }

    /// `Buffering → Playing`, once audio flows again.
    pub fn exit_buffering(&self) -> bool {
        self.swap_state(PlaybackState::Buffering, PlaybackState::Playing)
    }

    fn swap_state(&self, expected: PlaybackState, to: PlaybackState) -> bool {
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if state.playback != expected {
                return false;
            }
            state.transition(to, &mut events);
        }
        self.emit_all(events);
        true
    }

    /// Position report from the timing engine. Clamped to the track; ignored
    /// if not finite.
    pub fn update_position(&self, time: f64) {
        if !time.is_finite() {
            return;
        }
        let mut state = self.inner.state.lock();
        state.position = state.clamp_position(time);
    }

    // ========================================================================
    // Chunk Registry Access
    // ========================================================================

    pub fn get_chunk(&self, index: usize) -> Option<ChunkInfo> {
        self.inner.state.lock().chunks.get(index).cloned()
    }

    pub fn get_chunk_count(&self) -> usize {
        self.inner.state.lock().chunks.len()
    }

    /// Loader progress report. Out-of-range indices are ignored.
    pub fn update_chunk_load_state(&self, index: usize, is_loading: bool, is_loaded: bool) {
        if !self.inner.state.lock().chunks.set_load_state(index, is_loading, is_loaded) {
            debug!(index, "Ignoring load state for unknown chunk");
        }
    }

    /// Attach decoded audio. Out-of-range indices are ignored.
    pub fn set_chunk_audio_buffer(&self, index: usize, buffer: AudioBuffer) {
        if !self.inner.state.lock().chunks.set_audio_buffer(index, buffer) {
            debug!(index, "Ignoring audio buffer for unknown chunk");
        }
    }

    /// Loader failure report.
    ///
    /// The chunk is marked failed and a `PlaybackError` event fires. If it is
    /// the chunk the latest request targets, the state becomes `Error` and
    /// the pending wait fails with `ChunkLoadFailed`.
    pub fn report_chunk_failure(&self, index: usize, reason: impl Into<String>) {
        let reason = reason.into();
        let mut events = Vec::new();
        {
            let mut state = self.inner.state.lock();
            if !state.chunks.mark_failed(index, reason.clone()) {
                debug!(index, "Ignoring failure for unknown chunk");
                return;
            }
            if state.current_chunk == Some(index) {
                state.transition(PlaybackState::Error, &mut events);
            }
            events.push(ControllerEvent::PlaybackError {
                chunk_index: Some(index),
                message: reason.clone(),
            });
        }
        warn!(chunk_index = index, reason = %reason, "Chunk load failed");
        self.emit_all(events);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        self.inner.state.lock().playback
    }

    pub fn position(&self) -> f64 {
        self.inner.state.lock().position
    }

    pub fn metadata(&self) -> Option<StreamMetadata> {
        self.inner.state.lock().metadata
    }

    /// Chunk targeted by the latest play/seek.
    pub fn current_chunk(&self) -> Option<usize> {
        self.inner.state.lock().current_chunk
    }

    pub fn timeout_manager(&self) -> Arc<AdaptiveTimeoutManager> {
        Arc::clone(&self.inner.timeouts)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Current request epoch.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Register a listener for one event kind.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&ControllerEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.inner.listeners.on(kind, listener)
    }

    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.inner.listeners.off(&kind, id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner.listeners.listener_count(&kind)
    }

    fn emit_all(&self, events: Vec<ControllerEvent>) {
        for event in events {
            if self.is_destroyed() {
                return;
            }
            self.inner.listeners.emit(&event.kind(), &event);
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Clear chunks, metadata and listeners. No event fires afterwards and
    /// every in-flight wait is superseded. The controller is not reusable.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.next_epoch();
        *self.inner.state.lock() = ControllerState::default();
        self.inner.listeners.clear();
        self.inner.timeouts.reset();
        info!("Playback controller destroyed");
    }

    // ========================================================================
    // Waiting
    // ========================================================================

    fn next_epoch(&self) -> u64 {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    async fn wait_for_chunk(&self, epoch: u64, chunk_index: usize) -> Result<RequestOutcome> {
        let timeout = self.inner.timeouts.get_timeout();
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            if !self.is_current(epoch) {
                debug!(chunk_index, epoch, "Wait superseded");
                return Ok(RequestOutcome::Superseded { chunk_index });
            }

            let poll = {
                let state = self.inner.state.lock();
                match state.chunks.get(chunk_index) {
                    Some(chunk) if chunk.is_loaded => ChunkPoll::Loaded,
                    Some(chunk) if chunk.has_failed() => {
                        ChunkPoll::Failed(chunk.load_error.clone().unwrap_or_default())
                    }
                    Some(_) => ChunkPoll::Pending,
                    None => {
                        return Err(PlaybackError::ChunkOutOfRange {
                            index: chunk_index,
                            count: state.chunks.len(),
                        })
                    }
                }
            };

            match poll {
                ChunkPoll::Loaded => {
                    let waited = started.elapsed();
                    self.inner.timeouts.record_duration(chunk_index, waited);
                    debug!(chunk_index, waited_ms = waited.as_millis() as u64, "Chunk ready");
                    return Ok(RequestOutcome::Ready {
                        chunk_index,
                        waited,
                    });
                }
                ChunkPoll::Failed(reason) => {
                    self.inner
                        .timeouts
                        .record_duration(chunk_index, started.elapsed());
                    return Err(PlaybackError::ChunkLoadFailed {
                        chunk_index,
                        reason,
                    });
                }
                ChunkPoll::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                self.inner.timeouts.record_duration(chunk_index, timeout);
                let timeout_ms = timeout.as_millis() as u64;
                warn!(chunk_index, timeout_ms, "Timed out waiting for chunk");
                return Err(PlaybackError::ChunkLoadTimeout {
                    chunk_index,
                    timeout_ms,
                });
            }

            tokio::time::sleep(self.inner.config.poll_interval.min(deadline - now)).await;
        }
    }
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("PlaybackController")
            .field("state", &state.playback)
            .field("position", &state.position)
            .field("chunks", &state.chunks.len())
            .field("epoch", &self.epoch())
            .finish()
    }
}

fn check_range(chunks: &ChunkRegistry, index: usize) -> Result<()> {
    if index < chunks.len() {
        Ok(())
    } else {
        Err(PlaybackError::ChunkOutOfRange {
            index,
            count: chunks.len(),
        })
    }
}

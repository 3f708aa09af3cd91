//! # Chunk Preloading
//!
//! Listens to the controller's `PlayRequested`/`SeekRequested` events and
//! fetches chunks through a [`ChunkLoader`], most urgent first:
//!
//! | Priority   | Chunks                                  |
//! |------------|-----------------------------------------|
//! | `Critical` | the requested chunk                     |
//! | `High`     | its neighbours (seek only, next first)  |
//! | `Normal`   | `lookahead_chunks` chunks further ahead |
//!
//! At most `max_concurrent_loads` loads run at once. A new request replaces
//! whatever was still queued; loads already running are left to finish.
//! Chunks that are loading or loaded are never scheduled again.

use crate::config::PreloadConfig;
use crate::controller::PlaybackController;
use crate::error::{PlaybackError, Result};
use crate::events::{ControllerEvent, EventKind};
use crate::traits::ChunkLoader;
use core_runtime::events::ListenerId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadPriority {
    Normal,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRequest {
    pub chunk_index: usize,
    pub priority: LoadPriority,
}

impl LoadRequest {
    pub fn new(chunk_index: usize, priority: LoadPriority) -> Self {
        Self {
            chunk_index,
            priority,
        }
    }
}

/// Loads implied by a controller event, most urgent first.
///
/// Indices at or past `chunk_count` are dropped. Events other than play and
/// seek requests produce no work.
pub fn plan_loads(event: &ControllerEvent, chunk_count: usize, lookahead: usize) -> Vec<LoadRequest> {
    let (target, adjacent) = match event {
        ControllerEvent::PlayRequested { chunk_index, .. } => (*chunk_index, None),
        ControllerEvent::SeekRequested {
            target_chunk,
            adjacent_chunks,
            ..
        } => (*target_chunk, Some(*adjacent_chunks)),
        _ => return Vec::new(),
    };

    if target >= chunk_count {
        return Vec::new();
    }

    let mut plan = vec![LoadRequest::new(target, LoadPriority::Critical)];
    let mut furthest = target;

    if let Some(adjacent) = adjacent {
        for index in [adjacent.next, adjacent.prev].into_iter().flatten() {
            if index < chunk_count {
                plan.push(LoadRequest::new(index, LoadPriority::High));
                furthest = furthest.max(index);
            }
        }
    }

    plan.extend(
        (furthest + 1..chunk_count)
            .take(lookahead)
            .map(|index| LoadRequest::new(index, LoadPriority::Normal)),
    );
    plan
}

#[derive(Default)]
struct PreloadQueue {
    pending: VecDeque<LoadRequest>,
    /// Running loads by chunk, tagged with a ticket so a finished load never
    /// removes a newer one for the same chunk.
    active: HashMap<usize, (u64, JoinHandle<()>)>,
    next_ticket: u64,
}

struct PreloadInner {
    controller: PlaybackController,
    loader: Arc<dyn ChunkLoader>,
    config: PreloadConfig,
    permits: Arc<Semaphore>,
    runtime: Handle,
    queue: Mutex<PreloadQueue>,
}

impl PreloadInner {
    fn on_request(self: &Arc<Self>, event: &ControllerEvent) {
        let plan = plan_loads(
            event,
            self.controller.get_chunk_count(),
            self.config.lookahead_chunks,
        );
        if plan.is_empty() {
            return;
        }
        trace!(planned = plan.len(), "Replacing preload queue");
        self.queue.lock().pending = plan.into();
        self.pump();
    }

    /// Start queued loads while permits are available.
    fn pump(self: &Arc<Self>) {
        let mut queue = self.queue.lock();

        while !queue.pending.is_empty() {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            let Some(request) = queue.pending.pop_front() else {
                break;
            };

            let index = request.chunk_index;
            if queue.active.contains_key(&index) {
                continue;
            }
            match self.controller.get_chunk(index) {
                Some(chunk) if chunk.needs_load() => {}
                _ => continue,
            }

            let ticket = queue.next_ticket;
            queue.next_ticket += 1;

            self.controller.update_chunk_load_state(index, true, false);
            debug!(chunk_index = index, priority = ?request.priority, "Starting chunk load");

            let inner = Arc::clone(self);
            let handle = self
                .runtime
                .spawn(async move { inner.run_load(index, ticket, permit).await });
            queue.active.insert(index, (ticket, handle));
        }
    }

    async fn run_load(self: Arc<Self>, index: usize, ticket: u64, permit: OwnedSemaphorePermit) {
        match self.loader.load_chunk(index).await {
            Ok(buffer) => {
                self.controller.set_chunk_audio_buffer(index, buffer);
                self.controller.update_chunk_load_state(index, false, true);
                debug!(chunk_index = index, "Chunk loaded");
            }
            Err(err) => {
                self.controller.report_chunk_failure(index, err.to_string());
            }
        }
        drop(permit);

        {
            let mut queue = self.queue.lock();
            if matches!(queue.active.get(&index), Some((current, _)) if *current == ticket) {
                queue.active.remove(&index);
            }
        }
        self.pump();
    }

    fn cancel_all(&self) {
        let aborted: Vec<usize> = {
            let mut queue = self.queue.lock();
            queue.pending.clear();
            queue
                .active
                .drain()
                .map(|(index, (_, handle))| {
                    handle.abort();
                    index
                })
                .collect()
        };

        for index in aborted {
            self.controller.update_chunk_load_state(index, false, false);
        }
    }
}

/// Drives a [`ChunkLoader`] from controller events.
///
/// Dropping the manager unsubscribes it and aborts running loads.
pub struct ChunkPreloadManager {
    inner: Arc<PreloadInner>,
    subscriptions: Mutex<Vec<(EventKind, ListenerId)>>,
}

impl ChunkPreloadManager {
    /// Subscribe to `controller` and start serving its requests.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Internal` if the configuration is invalid or
    /// no Tokio runtime is running.
    pub fn attach(
        controller: PlaybackController,
        loader: Arc<dyn ChunkLoader>,
        config: PreloadConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PlaybackError::Internal(format!("Invalid preload config: {}", e)))?;
        let runtime = Handle::try_current().map_err(|e| {
            PlaybackError::Internal(format!("Chunk preloader needs a Tokio runtime: {}", e))
        })?;

        let inner = Arc::new(PreloadInner {
            controller: controller.clone(),
            loader,
            permits: Arc::new(Semaphore::new(config.max_concurrent_loads)),
            config,
            runtime,
            queue: Mutex::new(PreloadQueue::default()),
        });

        let mut subscriptions = Vec::new();
        for kind in [EventKind::PlayRequested, EventKind::SeekRequested] {
            let weak: Weak<PreloadInner> = Arc::downgrade(&inner);
            let id = controller.on(kind, move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_request(event);
                }
                Ok(())
            });
            subscriptions.push((kind, id));
        }

        Ok(Self {
            inner,
            subscriptions: Mutex::new(subscriptions),
        })
    }

    /// Queue loads outside the event flow, e.g. to warm the first chunks of
    /// a track. Requests are merged by priority ahead of normal work.
    pub fn schedule(&self, requests: impl IntoIterator<Item = LoadRequest>) {
        {
            let mut queue = self.inner.queue.lock();
            queue.pending.extend(requests);
            queue
                .pending
                .make_contiguous()
                .sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        self.inner.pump();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().pending.len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.queue.lock().active.len()
    }

    pub fn config(&self) -> &PreloadConfig {
        &self.inner.config
    }

    /// Drop queued work and abort running loads. Aborted chunks return to
    /// the not-loading state.
    pub fn cancel_all(&self) {
        self.inner.cancel_all();
    }

    /// Unsubscribe from the controller and cancel everything.
    pub fn detach(&self) {
        for (kind, id) in self.subscriptions.lock().drain(..) {
            self.inner.controller.off(kind, id);
        }
        self.inner.cancel_all();
    }
}

impl Drop for ChunkPreloadManager {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for ChunkPreloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPreloadManager")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_count())
            .field("active", &self.active_count())
            .finish()
    }
}

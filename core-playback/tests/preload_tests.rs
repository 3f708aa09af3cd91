use async_trait::async_trait;
use core_playback::{
    AudioBuffer, ChunkLoader, ChunkPreloadManager, EventKind, LoadPriority, LoadRequest,
    PlaybackController, PlaybackError, PlaybackState, PreloadConfig, StreamMetadata,
};
use mockall::mock;
use mockall::predicate::eq;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

mock! {
    pub Loader {}

    #[async_trait]
    impl ChunkLoader for Loader {
        async fn load_chunk(&self, chunk_index: usize) -> core_playback::Result<AudioBuffer>;
    }
}

/// Loader that records call order and peak concurrency.
struct RecordingLoader {
    delay: Duration,
    order: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingLoader {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            order: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    fn order(&self) -> Vec<usize> {
        self.order.lock().clone()
    }
}

#[async_trait]
impl ChunkLoader for RecordingLoader {
    async fn load_chunk(&self, chunk_index: usize) -> core_playback::Result<AudioBuffer> {
        self.order.lock().push(chunk_index);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(AudioBuffer::silence(0.1, 8_000, 1))
    }
}

fn buffer() -> AudioBuffer {
    AudioBuffer::silence(0.1, 8_000, 1)
}

/// 100 s track, 10 s contiguous chunks.
fn controller() -> PlaybackController {
    let controller = PlaybackController::new();
    let meta = StreamMetadata::contiguous(100.0, 10.0);
    controller.init_chunks(meta.chunk_count());
    controller.set_metadata(meta).unwrap();
    controller
}

fn config(max_concurrent_loads: usize) -> PreloadConfig {
    PreloadConfig {
        lookahead_chunks: 2,
        max_concurrent_loads,
    }
}

fn loaded(controller: &PlaybackController) -> Vec<usize> {
    (0..controller.get_chunk_count())
        .filter(|i| controller.get_chunk(*i).is_some_and(|c| c.is_loaded))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_seek_loads_target_neighbours_and_lookahead() {
    let controller = controller();
    let mut loader = MockLoader::new();
    loader.expect_load_chunk().times(5).returning(|_| Ok(buffer()));

    let _preloader =
        ChunkPreloadManager::attach(controller.clone(), Arc::new(loader), config(3)).unwrap();

    let outcome = controller.seek(55.0).await.unwrap();
    assert!(outcome.is_ready());
    assert_eq!(outcome.chunk_index(), 5);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(loaded(&controller), vec![4, 5, 6, 7, 8]);
    assert!(controller.get_chunk(5).unwrap().audio_buffer.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_loads_run_in_priority_order() {
    let controller = controller();
    let loader = RecordingLoader::new(Duration::from_millis(100));
    let _preloader =
        ChunkPreloadManager::attach(controller.clone(), loader.clone(), config(1)).unwrap();

    controller.seek(55.0).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(loader.order(), vec![5, 6, 4, 7, 8]);
    assert_eq!(loader.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let controller = controller();
    let loader = RecordingLoader::new(Duration::from_millis(100));
    let preloader =
        ChunkPreloadManager::attach(controller.clone(), loader.clone(), config(2)).unwrap();

    controller.seek(55.0).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(loader.peak.load(Ordering::SeqCst), 2);
    assert_eq!(loaded(&controller), vec![4, 5, 6, 7, 8]);
    assert_eq!(preloader.active_count(), 0);
    assert_eq!(preloader.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_play_loads_lookahead() {
    let controller = controller();
    controller.update_position(23.0);
    let loader = RecordingLoader::new(Duration::from_millis(10));
    let _preloader =
        ChunkPreloadManager::attach(controller.clone(), loader.clone(), config(3)).unwrap();

    controller.play().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let mut order = loader.order();
    order.sort_unstable();
    assert_eq!(order, vec![2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_loaded_chunks_are_not_reloaded() {
    let controller = controller();
    controller.set_chunk_audio_buffer(5, buffer());
    controller.update_chunk_load_state(5, false, true);

    let mut loader = MockLoader::new();
    loader.expect_load_chunk().with(eq(5)).never();
    loader.expect_load_chunk().times(4).returning(|_| Ok(buffer()));

    let _preloader =
        ChunkPreloadManager::attach(controller.clone(), Arc::new(loader), config(3)).unwrap();

    controller.seek(55.0).await.unwrap();
    sleep(Duration::from_millis(10)).await;

    // Everything around 56 s is already resident.
    controller.seek(56.0).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(loaded(&controller), vec![4, 5, 6, 7, 8]);
}

#[tokio::test(start_paused = true)]
async fn test_loader_failure_fails_the_wait() {
    let controller = controller();
    controller.update_position(23.0);

    let mut loader = MockLoader::new();
    loader
        .expect_load_chunk()
        .with(eq(2))
        .returning(|_| Err(PlaybackError::Loader("HTTP 404".to_string())));
    loader.expect_load_chunk().returning(|_| Ok(buffer()));

    let _preloader =
        ChunkPreloadManager::attach(controller.clone(), Arc::new(loader), config(3)).unwrap();

    let err = controller.play().await.unwrap_err();
    assert_eq!(
        err,
        PlaybackError::ChunkLoadFailed {
            chunk_index: 2,
            reason: "Chunk loader error: HTTP 404".to_string()
        }
    );
    assert_eq!(controller.state(), PlaybackState::Error);
    assert!(controller.get_chunk(2).unwrap().has_failed());
}

#[tokio::test(start_paused = true)]
async fn test_new_request_replaces_queued_work() {
    let controller = controller();
    let loader = RecordingLoader::new(Duration::from_secs(1));
    let _preloader =
        ChunkPreloadManager::attach(controller.clone(), loader.clone(), config(1)).unwrap();

    let seeker = controller.clone();
    let first = tokio::spawn(async move { seeker.seek(55.0).await });
    sleep(Duration::from_millis(10)).await;

    let outcome = controller.seek(15.0).await.unwrap();
    assert_eq!(outcome.chunk_index(), 1);
    assert!(!first.await.unwrap().unwrap().is_ready());

    sleep(Duration::from_secs(10)).await;
    assert_eq!(loader.order(), vec![5, 1, 2, 0, 3, 4]);
    assert!(!controller.get_chunk(6).unwrap().is_loaded);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_aborts_running_loads() {
    let controller = controller();
    let loader = RecordingLoader::new(Duration::from_secs(30));
    let preloader =
        ChunkPreloadManager::attach(controller.clone(), loader.clone(), config(2)).unwrap();

    let seeker = controller.clone();
    let pending_seek = tokio::spawn(async move { seeker.seek(55.0).await });
    sleep(Duration::from_millis(10)).await;
    assert_eq!(preloader.active_count(), 2);
    assert_eq!(preloader.pending_count(), 3);

    preloader.cancel_all();
    assert_eq!(preloader.active_count(), 0);
    assert_eq!(preloader.pending_count(), 0);
    assert!(!controller.get_chunk(5).unwrap().is_loading);

    controller.stop();
    assert!(!pending_seek.await.unwrap().unwrap().is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_schedule_orders_by_priority() {
    let controller = controller();
    let loader = RecordingLoader::new(Duration::from_millis(50));
    let preloader =
        ChunkPreloadManager::attach(controller.clone(), loader.clone(), config(1)).unwrap();

    preloader.schedule([
        LoadRequest::new(0, LoadPriority::Normal),
        LoadRequest::new(3, LoadPriority::Critical),
        LoadRequest::new(1, LoadPriority::High),
    ]);
    sleep(Duration::from_secs(1)).await;

    assert_eq!(loader.order(), vec![3, 1, 0]);
    assert_eq!(loaded(&controller), vec![0, 1, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_detach_unsubscribes() {
    let controller = controller();
    let loader = RecordingLoader::new(Duration::from_millis(10));
    let preloader =
        ChunkPreloadManager::attach(controller.clone(), loader.clone(), config(3)).unwrap();
    assert_eq!(controller.listener_count(EventKind::PlayRequested), 1);
    assert_eq!(controller.listener_count(EventKind::SeekRequested), 1);

    drop(preloader);
    assert_eq!(controller.listener_count(EventKind::PlayRequested), 0);
    assert_eq!(controller.listener_count(EventKind::SeekRequested), 0);

    controller.update_chunk_load_state(0, false, true);
    controller.play().await.unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(loader.order().is_empty());
}

#[tokio::test]
async fn test_attach_rejects_invalid_config() {
    let result = ChunkPreloadManager::attach(
        controller(),
        RecordingLoader::new(Duration::ZERO),
        config(0),
    );
    assert!(matches!(result, Err(PlaybackError::Internal(msg)) if msg.contains("max_concurrent_loads")));
}

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::websocket::{
    WebSocketChannel, WebSocketConnector, WebSocketSink, WebSocketStream, WsFrame,
};
use core_playback::{AudioBuffer, ChunkLoader, PlaybackError, PlaybackState, StreamMetadata};
use core_protocol::ConnectionState;
use core_runtime::events::{ConnectionEvent, CoreEvent, PlaybackEvent};
use core_service::{CoreConfig, CoreError, EventStream, PlayerSession};
use mockall::mock;
use std::collections::VecDeque;
use std::sync::Arc;

mock! {
    pub Connector {}

    #[async_trait]
    impl WebSocketConnector for Connector {
        async fn connect(&self, url: &str) -> BridgeResult<WebSocketChannel>;
    }
}

struct NullSink;

#[async_trait]
impl WebSocketSink for NullSink {
    async fn send_text(&mut self, _text: String) -> BridgeResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> BridgeResult<()> {
        Ok(())
    }
}

/// Yields the scripted text frames, then stays open.
struct ScriptedStream {
    frames: VecDeque<String>,
}

#[async_trait]
impl WebSocketStream for ScriptedStream {
    async fn next_frame(&mut self) -> Option<BridgeResult<WsFrame>> {
        match self.frames.pop_front() {
            Some(text) => Some(Ok(WsFrame::Text(text))),
            None => {
                std::future::pending::<()>().await;
                None
            }
        }
    }
}

fn connector(inbound: Vec<&'static str>) -> MockConnector {
    let mut connector = MockConnector::new();
    connector
        .expect_connect()
        .withf(|url| url == "ws://player.test:8765/ws")
        .returning(move |_| {
            Ok(WebSocketChannel::new(
                Box::new(NullSink),
                Box::new(ScriptedStream {
                    frames: inbound.iter().map(|text| text.to_string()).collect(),
                }),
            ))
        });
    connector
}

struct InstantLoader;

#[async_trait]
impl ChunkLoader for InstantLoader {
    async fn load_chunk(&self, _chunk_index: usize) -> core_playback::Result<AudioBuffer> {
        Ok(AudioBuffer::silence(10.0, 8_000, 1))
    }
}

fn config(connector: MockConnector, preload: bool) -> CoreConfig {
    CoreConfig::builder()
        .server_url("ws://player.test:8765")
        .connector(Arc::new(connector))
        .enable_preload(preload)
        .enable_heartbeat(false)
        .build()
        .unwrap()
}

fn session(inbound: Vec<&'static str>) -> PlayerSession {
    PlayerSession::new(config(connector(inbound), true), Arc::new(InstantLoader)).unwrap()
}

fn drain(stream: &mut EventStream) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Some(Ok(event)) = stream.try_recv() {
        events.push(event);
    }
    events
}

fn track() -> StreamMetadata {
    StreamMetadata::new(100.0, 10.0, Some(10.0))
}

#[test]
fn test_preloading_needs_a_runtime() {
    let err = PlayerSession::new(config(connector(vec![]), true), Arc::new(InstantLoader))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Playback(PlaybackError::Internal(ref msg)) if msg.contains("Tokio runtime")
    ));

    let session =
        PlayerSession::new(config(connector(vec![]), false), Arc::new(InstantLoader)).unwrap();
    assert!(session.preloader().is_none());
}

#[tokio::test]
async fn test_core_flags_reach_components() {
    let session = session(vec![]);
    assert!(session.preloader().is_some());
    assert!(!session.client().config().enable_heartbeat);
    assert_eq!(session.client().url(), "ws://player.test:8765/ws");
    assert_eq!(session.client().state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_load_track_rebuilds_registry() {
    let session = session(vec![]);
    session.load_track(track()).unwrap();
    assert_eq!(session.controller().get_chunk_count(), 10);
    assert_eq!(session.controller().metadata(), Some(track()));

    let err = session
        .load_track(StreamMetadata::contiguous(100.0, 0.0))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Playback(PlaybackError::InvalidMetadata(_))
    ));
    assert_eq!(session.controller().get_chunk_count(), 10);

    session.load_track(StreamMetadata::contiguous(45.0, 10.0)).unwrap();
    assert_eq!(session.controller().get_chunk_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_seek_is_preloaded_and_published() {
    let session = session(vec![]);
    let mut stream = session.subscribe();
    session.load_track(track()).unwrap();

    let outcome = session.controller().seek(55.0).await.unwrap();
    assert!(outcome.is_ready());
    assert_eq!(outcome.chunk_index(), 5);
    assert!(session.controller().get_chunk(5).unwrap().is_loaded);

    let events = drain(&mut stream);
    assert!(events.contains(&CoreEvent::Playback(PlaybackEvent::SeekRequested {
        target_time: 55.0,
        target_chunk: 5,
        was_playing: false,
    })));
}

#[tokio::test(start_paused = true)]
async fn test_next_track_starts_from_the_top() {
    let session = session(vec![]);
    session.load_track(track()).unwrap();
    session.controller().seek(55.0).await.unwrap();
    session.controller().play().await.unwrap();
    assert_eq!(session.controller().state(), PlaybackState::Playing);

    let mut stream = session.subscribe();
    session.load_track(StreamMetadata::contiguous(200.0, 10.0)).unwrap();
    assert_eq!(session.controller().position(), 0.0);
    assert_eq!(session.controller().state(), PlaybackState::Idle);
    assert!(drain(&mut stream).contains(&CoreEvent::Playback(PlaybackEvent::StateChanged {
        from: "playing".to_string(),
        to: "idle".to_string(),
    })));

    let outcome = session.controller().play().await.unwrap();
    assert_eq!(outcome.chunk_index(), 0);
    assert!(outcome.is_ready());
}

#[tokio::test]
async fn test_connection_events_are_published() {
    let session = session(vec![]);
    let mut stream = session
        .subscribe()
        .filter(|event| matches!(event, CoreEvent::Connection(_)));

    session.connect().await.unwrap();
    assert_eq!(
        stream.recv().await.unwrap(),
        CoreEvent::Connection(ConnectionEvent::Connecting)
    );
    assert_eq!(
        stream.recv().await.unwrap(),
        CoreEvent::Connection(ConnectionEvent::Connected)
    );

    session.commands().pause().await.unwrap();
}

#[tokio::test]
async fn test_protocol_errors_are_published() {
    let session = session(vec!["{ not json"]);
    let mut stream = session.subscribe();
    session.connect().await.unwrap();

    loop {
        match stream.recv().await.unwrap() {
            CoreEvent::Connection(ConnectionEvent::Error { message }) => {
                assert!(message.starts_with("Message serialization failed"), "{message}");
                break;
            }
            _ => continue,
        }
    }
    assert!(session.client().is_connected());
}

#[tokio::test]
async fn test_shutdown_tears_everything_down() {
    let session = session(vec![]);
    let mut stream = session.subscribe();
    session.connect().await.unwrap();
    session.load_track(track()).unwrap();

    session.shutdown();
    assert!(session.is_shut_down());
    assert_eq!(session.client().state(), ConnectionState::Disconnected);
    assert!(session.controller().is_destroyed());
    assert_eq!(session.controller().get_chunk_count(), 0);
    assert_eq!(session.preloader().map(|p| p.pending_count()), Some(0));

    let events = drain(&mut stream);
    assert_eq!(
        events.last(),
        Some(&CoreEvent::Connection(ConnectionEvent::Disconnected {
            reason: Some("Client disconnected".to_string()),
        }))
    );

    session.shutdown();
    assert!(drain(&mut stream).is_empty());
    assert!(matches!(
        session.load_track(track()),
        Err(CoreError::SessionClosed)
    ));
    assert!(matches!(session.connect().await, Err(CoreError::SessionClosed)));
}

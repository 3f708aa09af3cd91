//! # Player Session
//!
//! One session owns the collaborators a host needs to stream a track:
//!
//! - a [`WebSocketProtocolClient`] for the backend socket, shared with
//!   [`PlayerCommands`]
//! - a [`PlaybackController`] holding transport state and the chunk registry
//! - a [`ChunkPreloadManager`] feeding the registry through the host's
//!   [`ChunkLoader`] (only when `FeatureFlags::enable_preload` is set)
//!
//! Controller events, connection events and asynchronous protocol errors are
//! republished as [`CoreEvent`]s on the session's bus.
//!
//! ```rust,no_run
//! use core_playback::{ChunkLoader, StreamMetadata};
//! use core_service::{CoreConfig, PlayerSession};
//! use std::sync::Arc;
//!
//! # async fn run(loader: Arc<dyn ChunkLoader>) -> core_service::Result<()> {
//! let config = CoreConfig::builder()
//!     .server_url("ws://localhost:8765")
//!     .build()?;
//! let session = PlayerSession::new(config, loader)?;
//! let mut events = session.subscribe();
//!
//! session.connect().await?;
//! session.load_track(StreamMetadata {
//!     duration: 180.0,
//!     chunk_duration: 10.0,
//!     chunk_interval: None,
//! })?;
//! session.controller().play().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.description());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{CoreError, Result};
use crate::events::playback_event;
use core_playback::{
    ChunkLoader, ChunkPreloadManager, ControllerConfig, EventKind, PlaybackController,
    PreloadConfig, StreamMetadata,
};
use core_protocol::{PlayerCommands, ProtocolConfig, WebSocketProtocolClient};
use core_runtime::config::CoreConfig;
use core_runtime::events::{
    ConnectionEvent, CoreEvent, EventBus, EventStream, ListenerId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const FORWARDED_KINDS: [EventKind; 6] = [
    EventKind::PlayRequested,
    EventKind::PauseRequested,
    EventKind::SeekRequested,
    EventKind::StopRequested,
    EventKind::StateChanged,
    EventKind::PlaybackError,
];

/// Per-component settings for a [`PlayerSession`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub controller: ControllerConfig,
    pub preload: PreloadConfig,
    pub protocol: ProtocolConfig,
}

#[derive(Default)]
struct Subscriptions {
    controller: Vec<(EventKind, ListenerId)>,
    connection: Option<ListenerId>,
    errors: Option<ListenerId>,
}

pub struct PlayerSession {
    config: CoreConfig,
    controller: PlaybackController,
    client: WebSocketProtocolClient,
    commands: PlayerCommands,
    preloader: Option<ChunkPreloadManager>,
    events: EventBus,
    subscriptions: Mutex<Subscriptions>,
    closed: AtomicBool,
}

impl PlayerSession {
    /// Build a session with default component settings.
    ///
    /// # Errors
    ///
    /// See [`with_options`](Self::with_options).
    pub fn new(config: CoreConfig, loader: Arc<dyn ChunkLoader>) -> Result<Self> {
        Self::with_options(config, loader, SessionOptions::default())
    }

    /// Build a session.
    ///
    /// # Errors
    ///
    /// - `Protocol(InvalidConfig)` for invalid protocol settings or URL
    /// - `Playback(Internal)` for invalid controller or preload settings, or
    ///   when preloading is enabled outside a Tokio runtime
    pub fn with_options(
        config: CoreConfig,
        loader: Arc<dyn ChunkLoader>,
        options: SessionOptions,
    ) -> Result<Self> {
        let client = WebSocketProtocolClient::from_core_config(&config, options.protocol)?;
        let controller = PlaybackController::with_config(options.controller)?;
        let preloader = if config.features.enable_preload {
            Some(ChunkPreloadManager::attach(
                controller.clone(),
                loader,
                options.preload,
            )?)
        } else {
            None
        };

        let events = EventBus::new(config.event_buffer_size);
        let subscriptions = Subscriptions {
            controller: FORWARDED_KINDS
                .iter()
                .map(|kind| {
                    let bus = events.clone();
                    let id = controller.on(*kind, move |event| {
                        let _ = bus.emit(CoreEvent::Playback(playback_event(event)));
                        Ok(())
                    });
                    (*kind, id)
                })
                .collect(),
            connection: Some({
                let bus = events.clone();
                client.on_connection_event(move |event| {
                    let _ = bus.emit(CoreEvent::Connection(event.clone()));
                    Ok(())
                })
            }),
            errors: Some({
                let bus = events.clone();
                client.on_error(move |err| {
                    let _ = bus.emit(CoreEvent::Connection(ConnectionEvent::Error {
                        message: err.to_string(),
                    }));
                    Ok(())
                })
            }),
        };

        info!(
            url = %client.url(),
            preload = preloader.is_some(),
            heartbeat = client.config().enable_heartbeat,
            "Player session created"
        );

        Ok(Self {
            commands: PlayerCommands::new(client.clone()),
            config,
            controller,
            client,
            preloader,
            events,
            subscriptions: Mutex::new(subscriptions),
            closed: AtomicBool::new(false),
        })
    }

    /// Open the backend socket.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_open()?;
        self.client.connect().await?;
        Ok(())
    }

    /// Make `metadata` the current track: queued preloads are dropped, the
    /// chunk registry is rebuilt, the playhead rewinds to 0 in `Idle` and the
    /// timing is stored.
    ///
    /// # Errors
    ///
    /// - `Playback(InvalidMetadata)` if the timing is unusable; the previous
    ///   track stays loaded
    /// - `SessionClosed` after [`shutdown`](Self::shutdown)
    pub fn load_track(&self, metadata: StreamMetadata) -> Result<()> {
        self.ensure_open()?;
        metadata.validate()?;

        if let Some(preloader) = &self.preloader {
            preloader.cancel_all();
        }
        let chunk_count = metadata.chunk_count();
        self.controller.init_chunks(chunk_count);
        self.controller.set_metadata(metadata)?;
        debug!(chunk_count, duration = metadata.duration, "Track loaded");
        Ok(())
    }

    /// Disconnect, stop preloading and destroy the controller. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.client.disconnect();
        if let Some(preloader) = &self.preloader {
            preloader.detach();
        }

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for (kind, id) in subscriptions.controller {
            self.controller.off(kind, id);
        }
        if let Some(id) = subscriptions.connection {
            self.client.off_connection_event(id);
        }
        if let Some(id) = subscriptions.errors {
            self.client.off_error(id);
        }

        self.controller.destroy();
        info!("Player session shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn client(&self) -> &WebSocketProtocolClient {
        &self.client
    }

    pub fn commands(&self) -> &PlayerCommands {
        &self.commands
    }

    /// `None` when preloading is disabled.
    pub fn preloader(&self) -> Option<&ChunkPreloadManager> {
        self.preloader.as_ref()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stream of every event the session publishes from now on.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(CoreError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSession")
            .field("url", &self.client.url())
            .field("state", &self.controller.state())
            .field("connection", &self.client.state())
            .field("preload", &self.preloader.is_some())
            .field("closed", &self.is_shut_down())
            .finish()
    }
}

//! # Event Infrastructure
//!
//! Two complementary mechanisms for decoupled communication between core
//! modules:
//!
//! - [`ListenerRegistry`]: ordered, per-key synchronous callbacks. Used by the
//!   playback controller for its request events and by the protocol client for
//!   message-type handlers. A failing or panicking listener never reaches the
//!   emitter or the listeners after it.
//! - [`EventBus`]: a `tokio::sync::broadcast` channel of [`CoreEvent`]s for
//!   consumers that want an async stream of everything a session does.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐  on/emit  ┌──────────────────┐
//! │ PlaybackController ├──────────>│ ListenerRegistry │──> preloader, UI
//! └─────────┬──────────┘           └──────────────────┘
//!           │ forwarded by PlayerSession
//!           v
//!     ┌───────────┐    subscribe   ┌────────────┐
//!     │ EventBus  ├───────────────>│ Subscriber │
//!     └───────────┘                └────────────┘
//!           ^
//!           │ forwarded by PlayerSession
//! ┌─────────┴──────────────┐
//! │ WebSocketProtocolClient│
//! └────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Registering listeners
//!
//! ```rust
//! use core_runtime::events::ListenerRegistry;
//!
//! let registry: ListenerRegistry<&'static str, u32> = ListenerRegistry::new();
//! let id = registry.on("volume", |level| {
//!     println!("volume is now {level}");
//!     Ok(())
//! });
//!
//! let failures = registry.emit(&"volume", &7);
//! assert!(failures.is_empty());
//! assert!(registry.off(&"volume", id));
//! ```
//!
//! ### Subscribing to the bus
//!
//! ```rust
//! use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(32);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Connection(ConnectionEvent::Connected)).ok();
//! assert_eq!(
//!     rx.recv().await.unwrap(),
//!     CoreEvent::Connection(ConnectionEvent::Connected)
//! );
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The bus can produce two receive errors:
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events. Log it and keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped. Stop receiving.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};
use tracing::error;

/// Default buffer size for the event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Listener Registry
// ============================================================================

/// Outcome of a single listener invocation.
pub type ListenerResult = anyhow::Result<()>;

/// A registered callback.
pub type Listener<T> = Arc<dyn Fn(&T) -> ListenerResult + Send + Sync>;

/// Handle returned by [`ListenerRegistry::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A listener that returned an error or panicked during [`ListenerRegistry::emit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub id: ListenerId,
    pub reason: String,
    pub panicked: bool,
}

/// Ordered set of listeners per key.
///
/// Listeners run in registration order. The internal lock is released before
/// any listener runs, so a listener may register or remove listeners
/// (including itself) without deadlocking; such changes apply from the next
/// `emit`.
pub struct ListenerRegistry<K, T> {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<K, Vec<(ListenerId, Listener<T>)>>>,
}

impl<K, T> ListenerRegistry<K, T>
where
    K: Eq + Hash + fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register `listener` under `key`.
    pub fn on<F>(&self, key: K, listener: F) -> ListenerId
    where
        F: Fn(&T) -> ListenerResult + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(key)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered under `key`.
    pub fn off(&self, key: &K, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(key) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(key);
        }
        removed
    }

    /// Remove every listener for every key.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub fn listener_count(&self, key: &K) -> usize {
        self.listeners.lock().get(key).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Invoke every listener registered under `key` with `payload`.
    ///
    /// Errors and panics are logged and collected; they never propagate.
    pub fn emit(&self, key: &K, payload: &T) -> Vec<ListenerFailure> {
        let snapshot: Vec<(ListenerId, Listener<T>)> = match self.listeners.lock().get(key) {
            Some(entries) => entries.clone(),
            None => return Vec::new(),
        };

        let mut failures = Vec::new();
        for (id, listener) in snapshot {
            let failure = match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => ListenerFailure {
                    id,
                    reason: format!("{:#}", err),
                    panicked: false,
                },
                Err(panic) => ListenerFailure {
                    id,
                    reason: panic_message(panic.as_ref()),
                    panicked: true,
                },
            };

            error!(
                key = ?key,
                listener = %failure.id,
                panicked = failure.panicked,
                error = %failure.reason,
                "Event listener failed"
            );
            failures.push(failure);
        }
        failures
    }
}

impl<K, T> Default for ListenerRegistry<K, T>
where
    K: Eq + Hash + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> fmt::Debug for ListenerRegistry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        f.debug_struct("ListenerRegistry")
            .field("keys", &listeners.len())
            .field("listeners", &listeners.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "listener panicked".to_string()
    }
}

// ============================================================================
// Core Events
// ============================================================================

/// Top-level event enum published on the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Playback controller events
    Playback(PlaybackEvent),
    /// Protocol connection events
    Connection(ConnectionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Connection(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Connection(ConnectionEvent::ReconnectExhausted { .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Connection(ConnectionEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Connection(ConnectionEvent::Disconnected { .. })
            | CoreEvent::Connection(ConnectionEvent::ReconnectScheduled { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Connection(ConnectionEvent::Connected) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::StateChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Playback events as seen by bus subscribers.
///
/// This is a flattened view of the controller's own events; states are
/// carried by name so the bus does not depend on `core-playback`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    PlayRequested {
        chunk_index: usize,
        offset_in_chunk: f64,
    },
    PauseRequested {
        pause_time: f64,
    },
    SeekRequested {
        target_time: f64,
        target_chunk: usize,
        was_playing: bool,
    },
    Stopped,
    StateChanged {
        from: String,
        to: String,
    },
    Error {
        message: String,
        chunk_index: Option<usize>,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::PlayRequested { .. } => "Playback requested",
            PlaybackEvent::PauseRequested { .. } => "Pause requested",
            PlaybackEvent::SeekRequested { .. } => "Seek requested",
            PlaybackEvent::Stopped => "Playback stopped",
            PlaybackEvent::StateChanged { .. } => "Playback state changed",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

/// Connection lifecycle of the protocol client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectionEvent {
    Connecting,
    Connected,
    Disconnected {
        reason: Option<String>,
    },
    ReconnectScheduled {
        attempt: u32,
        delay_ms: u64,
    },
    ReconnectExhausted {
        attempts: u32,
    },
    Error {
        message: String,
    },
}

impl ConnectionEvent {
    fn description(&self) -> &str {
        match self {
            ConnectionEvent::Connecting => "Connecting to server",
            ConnectionEvent::Connected => "Connected to server",
            ConnectionEvent::Disconnected { .. } => "Disconnected from server",
            ConnectionEvent::ReconnectScheduled { .. } => "Reconnect scheduled",
            ConnectionEvent::ReconnectExhausted { .. } => "Reconnect attempts exhausted",
            ConnectionEvent::Error { .. } => "Connection error",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus shares the underlying channel. Events emitted while nobody
/// is subscribed are dropped.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Returns the number of subscribers reached, or an
    /// error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates an independent receiver for all future events.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let connection_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Connection(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next matching event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. Returns `None` when nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

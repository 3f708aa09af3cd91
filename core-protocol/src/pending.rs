//! Outstanding requests keyed by correlation id.
//!
//! Registering returns a [`PendingResponse`] that removes its entry when it is
//! dropped, so a request that resolves, times out or is abandoned by its caller
//! never leaves anything behind.

use crate::error::{ProtocolError, Result};
use crate::message::WsMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

type Reply = oneshot::Sender<Result<WsMessage>>;

#[derive(Debug, Default)]
pub struct PendingResponses {
    next_token: AtomicU64,
    /// Reply channel per correlation id, tagged with the registering handle's
    /// token.
    entries: Mutex<HashMap<String, (u64, Reply)>>,
}

impl PendingResponses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for a reply to `correlation_id`. A previous wait for
    /// the same id is replaced.
    pub fn register(self: &Arc<Self>, correlation_id: impl Into<String>) -> PendingResponse {
        let correlation_id = correlation_id.into();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(correlation_id.clone(), (token, tx));
        PendingResponse {
            correlation_id,
            token,
            receiver: rx,
            table: Arc::clone(self),
        }
    }

    /// Deliver `message` to the request with its correlation id.
    ///
    /// Returns the message back when nobody was waiting for it.
    pub fn resolve(&self, message: WsMessage) -> Option<WsMessage> {
        let Some((_, reply)) = self.entries.lock().remove(&message.correlation_id) else {
            return Some(message);
        };
        // A dropped receiver means the caller gave up; the reply is discarded.
        let _ = reply.send(Ok(message));
        None
    }

    /// Fail every outstanding request.
    pub fn reject_all(&self, error: impl Fn() -> ProtocolError) -> usize {
        let drained: Vec<Reply> = self.entries.lock().drain().map(|(_, (_, tx))| tx).collect();
        let count = drained.len();
        for reply in drained {
            let _ = reply.send(Err(error()));
        }
        count
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.entries.lock().contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn remove(&self, correlation_id: &str, token: u64) {
        let mut entries = self.entries.lock();
        if matches!(entries.get(correlation_id), Some((current, _)) if *current == token) {
            entries.remove(correlation_id);
        }
    }
}

/// Handle for one outstanding request.
#[derive(Debug)]
pub struct PendingResponse {
    correlation_id: String,
    token: u64,
    receiver: oneshot::Receiver<Result<WsMessage>>,
    table: Arc<PendingResponses>,
}

impl PendingResponse {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// - `ResponseTimeout` if nothing arrives in time
    /// - `ConnectionClosed` (or whatever error the table was drained with) if
    ///   the socket dropped first
    pub async fn wait(mut self, timeout: Duration) -> Result<WsMessage> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ProtocolError::ConnectionClosed),
            Err(_) => Err(ProtocolError::ResponseTimeout {
                correlation_id: self.correlation_id.clone(),
                timeout,
            }),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.table.remove(&self.correlation_id, self.token);
    }
}

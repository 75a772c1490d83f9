//! Request/response skeleton for services built on the multiplexer: a
//! pending-continuation map keyed by request id, with a cancellation
//! timer per request and one response channel per requesting peer.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;
use uuid::Uuid;

use crate::error::{MeshError, Result};

/// Tracks outstanding requests for a single service client. Responses are
/// matched by request id against the map; unmatched responses are logged
/// and dropped, matching the late-response-discard rule.
#[derive(Default)]
pub struct RequestTracker {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Vec<u8>>>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh request id and return the receiver half the
    /// caller awaits. Pair with [`Self::await_response`] or drive the
    /// timeout manually.
    fn register(&self) -> (Uuid, oneshot::Receiver<Vec<u8>>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    /// Deliver a response payload for `request_id`. Returns `false` (and
    /// logs) if no continuation is pending for that id — either it never
    /// existed, or it already timed out.
    pub fn resolve(&self, request_id: Uuid, payload: Vec<u8>) -> bool {
        let sender = self.pending.lock().remove(&request_id);
        match sender {
            Some(sender) => sender.send(payload).is_ok(),
            None => {
                warn!("response for unknown or expired request id {request_id}");
                false
            }
        }
    }

    /// Register a request, run `send`, then wait for either a matching
    /// response or `timeout`. On timeout the pending entry is removed so a
    /// late-arriving response is discarded.
    pub async fn request<F, Fut>(&self, timeout: Duration, send: F) -> Result<Vec<u8>>
    where
        F: FnOnce(Uuid) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let (request_id, rx) = self.register();
        if let Err(e) = send(request_id).await {
            self.pending.lock().remove(&request_id);
            return Err(e);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(MeshError::InvalidResponse),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                Err(MeshError::Timeout("request/response".to_string()))
            }
        }
    }

    /// Resolve every outstanding continuation with `NotStarted`-equivalent
    /// cancellation by simply dropping the senders, which turns each
    /// pending `await` into a `RecvError` the caller surfaces.
    pub fn stop(&self) {
        self.pending.lock().clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

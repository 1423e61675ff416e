//! Correlation store
//!
//! Pending asks keyed by correlation id. Each entry is settled at most once:
//! by a matching reply or by its own timer, whichever comes first. Settling
//! removes the entry and cancels the timer.

use crate::error::{ActorError, Result};
use crate::protocol::Envelope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

type PendingMap = HashMap<String, Pending>;

struct Pending {
    tx: oneshot::Sender<Result<Envelope>>,
    timer: Option<JoinHandle<()>>,
}

impl Pending {
    fn settle(self, outcome: Result<Envelope>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // Caller may have dropped its PendingReply
        let _ = self.tx.send(outcome);
    }
}

/// Pending-request table owned by one actor
#[derive(Clone, Default)]
pub struct FutureStore {
    pending: Arc<Mutex<PendingMap>>,
}

impl FutureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request. With a timeout, the request is rejected
    /// with [`ActorError::Timeout`] once `timeout` elapses without a reply.
    pub fn register(&self, corr_id: &str, timeout: Option<Duration>) -> Result<PendingReply> {
        if corr_id.is_empty() {
            return Err(ActorError::MissingCorrelationId);
        }

        let mut pending = self.pending.lock();
        if pending.contains_key(corr_id) {
            return Err(ActorError::DuplicateCorrelationId(corr_id.to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let timer = timeout.map(|timeout| {
            let store = Arc::downgrade(&self.pending);
            let corr_id = corr_id.to_string();
            tokio::spawn(expire(store, corr_id, timeout))
        });
        pending.insert(corr_id.to_string(), Pending { tx, timer });

        Ok(PendingReply {
            corr_id: corr_id.to_string(),
            rx,
        })
    }

    /// Resolve the request waiting on `corr_id`. Unknown ids are ignored;
    /// returns whether a request was settled.
    pub fn resolve(&self, corr_id: &str, reply: Envelope) -> bool {
        self.settle(corr_id, Ok(reply))
    }

    /// Reject the request waiting on `corr_id`
    pub fn reject(&self, corr_id: &str, error: ActorError) -> bool {
        self.settle(corr_id, Err(error))
    }

    fn settle(&self, corr_id: &str, outcome: Result<Envelope>) -> bool {
        let entry = self.pending.lock().remove(corr_id);
        match entry {
            Some(pending) => {
                pending.settle(outcome);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, corr_id: &str) -> bool {
        self.pending.lock().contains_key(corr_id)
    }

    /// Number of requests still waiting
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl std::fmt::Debug for FutureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureStore")
            .field("pending", &self.len())
            .finish()
    }
}

async fn expire(store: Weak<Mutex<PendingMap>>, corr_id: String, timeout: Duration) {
    tokio::time::sleep(timeout).await;

    let Some(store) = store.upgrade() else {
        return;
    };
    let entry = store.lock().remove(&corr_id);
    if let Some(pending) = entry {
        debug!(corr_id = %corr_id, timeout_ms = timeout.as_millis() as u64, "Request timed out");
        // Already running inside this timer; nothing to abort
        let _ = pending
            .tx
            .send(Err(ActorError::timeout(corr_id, timeout.as_millis() as u64)));
    } else {
        trace!(corr_id = %corr_id, "Timer fired after settlement");
    }
}

/// Handle to a registered request; resolves with the reply envelope
#[derive(Debug)]
pub struct PendingReply {
    corr_id: String,
    rx: oneshot::Receiver<Result<Envelope>>,
}

impl PendingReply {
    pub fn corr_id(&self) -> &str {
        &self.corr_id
    }
}

impl Future for PendingReply {
    type Output = Result<Envelope>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ActorError::Abandoned(self.corr_id.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(corr_id: &str, value: i64) -> Envelope {
        Envelope::reply(
            &Envelope::ask(Envelope::tell("a", "b", "t", json!({})), Some(corr_id.into())),
            json!(value),
            None,
        )
    }

    #[tokio::test]
    async fn test_resolve_settles_once() {
        let store = FutureStore::new();
        let pending = store.register("c1", None).unwrap();

        assert!(store.resolve("c1", reply("c1", 1)));
        assert!(!store.resolve("c1", reply("c1", 2)));
        assert!(store.is_empty());

        let env = pending.await.unwrap();
        assert_eq!(env.payload, json!(1));
    }

    #[tokio::test]
    async fn test_unknown_id_is_noop() {
        let store = FutureStore::new();
        assert!(!store.resolve("missing", reply("missing", 1)));
    }

    #[tokio::test]
    async fn test_empty_and_duplicate_ids_fail_immediately() {
        let store = FutureStore::new();
        assert!(matches!(
            store.register("", None),
            Err(ActorError::MissingCorrelationId)
        ));

        let _first = store.register("dup", None).unwrap();
        assert!(matches!(
            store.register("dup", None),
            Err(ActorError::DuplicateCorrelationId(id)) if id == "dup"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rejects_at_deadline() {
        let store = FutureStore::new();
        let start = tokio::time::Instant::now();
        let pending = store.register("slow", Some(Duration::from_millis(250))).unwrap();

        let err = pending.await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ActorError::Timeout { ref corr_id, timeout_ms: 250 } if corr_id == "slow"));
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(260));
        assert!(store.is_empty());

        // Late reply is ignored
        assert!(!store.resolve("slow", reply("slow", 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_cancels_timer() {
        let store = FutureStore::new();
        let pending = store.register("fast", Some(Duration::from_secs(1))).unwrap();
        assert!(store.resolve("fast", reply("fast", 7)));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(pending.await.unwrap().payload, json!(7));
    }

    #[tokio::test]
    async fn test_dropped_store_abandons_request() {
        let store = FutureStore::new();
        let pending = store.register("orphan", None).unwrap();
        drop(store);

        assert!(matches!(pending.await, Err(ActorError::Abandoned(id)) if id == "orphan"));
    }

    #[tokio::test]
    async fn test_reject() {
        let store = FutureStore::new();
        let pending = store.register("c", None).unwrap();
        assert!(store.reject("c", ActorError::handler("boom")));
        assert!(matches!(pending.await, Err(ActorError::Handler(_))));
    }
}

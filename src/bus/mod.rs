//! Message bus for inter-instance communication.
//!
//! All cross-instance traffic flows through the shell's bus, enabling:
//!   - Full tracing and observability
//!   - Fault isolation between instances
//!   - Focus-stealing prevention (delivery has no focus side effects)
//!
//! Patterns supported:
//!   - **Point-to-point**: fire-and-forget to one destination, queued while
//!     the destination has no handler (bounded, drop-oldest)
//!   - **Broadcast**: best-effort fan-out to every registered handler
//!   - **Request/response**: correlated reply with timeout and cancellation
//!
//! Delivery crosses an mpsc channel into the destination's own task, so a
//! handler can never execute reentrantly inside the sending call. Messages to
//! the same destination arrive in send order whether they took the live path
//! or the queue-then-flush path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::types::{AppName, BusConfig, CorrelationId, Error, Result};

// =============================================================================
// Message Types
// =============================================================================

/// An inter-instance message. Immutable once constructed; delivery shares the
/// same `Arc` with every recipient and never touches the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from: AppName,
    /// None marks a broadcast.
    pub to: Option<AppName>,
    pub message_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    /// Set only on request and response messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl Message {
    fn point_to_point(
        from: AppName,
        to: AppName,
        message_type: impl Into<String>,
        data: Value,
        correlation_id: Option<CorrelationId>,
    ) -> Self {
        Self {
            from,
            to: Some(to),
            message_type: message_type.into(),
            data,
            timestamp: Utc::now(),
            correlation_id,
        }
    }

    fn broadcast(from: AppName, message_type: impl Into<String>, data: Value) -> Self {
        Self {
            from,
            to: None,
            message_type: message_type.into(),
            data,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// True for request messages, which expect a correlated response.
    pub fn expects_response(&self) -> bool {
        self.correlation_id.is_some()
    }
}

/// What handler channels carry. The cancellation token is present only for
/// request messages and fires once the pending request resolves by any path,
/// letting a slow responder abandon work nobody is waiting for.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Arc<Message>,
    pub cancellation: Option<CancellationToken>,
}

// =============================================================================
// Pending Requests
// =============================================================================

/// Book-keeping for one outstanding request. Exactly one terminal resolution
/// occurs: response, timeout, or cancellation.
#[derive(Debug)]
struct PendingRequest {
    requester: AppName,
    target: AppName,
    reply_tx: oneshot::Sender<Result<Value>>,
    timer: JoinHandle<()>,
    cancellation: CancellationToken,
}

/// Handle to an outstanding request. Await [`PendingReply::recv`] outside any
/// shell lock; it resolves to the response payload, a timeout error, or a
/// cancellation error when the target closes.
#[derive(Debug)]
pub struct PendingReply {
    correlation_id: CorrelationId,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Wait for the terminal resolution of this request.
    pub async fn recv(self) -> Result<Value> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::internal("reply channel closed before resolution")),
        }
    }
}

// =============================================================================
// MessageBus
// =============================================================================

/// Statistics about bus usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    pub messages_sent: u64,
    pub messages_queued: u64,
    pub messages_dropped: u64,
    pub broadcasts_sent: u64,
    pub requests_started: u64,
    pub requests_responded: u64,
    pub requests_timed_out: u64,
    pub requests_cancelled: u64,
}

#[derive(Debug, Default)]
struct BusState {
    /// At most one handler per app; re-registering replaces.
    handlers: HashMap<AppName, mpsc::UnboundedSender<Delivery>>,
    /// Bounded FIFO per unregistered destination.
    queues: HashMap<AppName, VecDeque<Delivery>>,
    pending: HashMap<CorrelationId, PendingRequest>,
    stats: BusStats,
}

/// In-memory message bus for shell-mediated inter-instance communication.
///
/// Cheaply cloneable; request timers and the sampler reach the shared state
/// without holding the shell lock. The bus never consults the instance
/// registry: sending to an unknown name queues speculatively.
#[derive(Debug, Clone)]
pub struct MessageBus {
    state: Arc<Mutex<BusState>>,
    config: BusConfig,
}

impl MessageBus {
    /// Create a new MessageBus instance.
    pub fn new(config: BusConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            config,
        }
    }

    // =========================================================================
    // Handler Registration
    // =========================================================================

    /// Register the handler channel for `app`, replacing any prior one.
    ///
    /// Messages queued while the app had no handler are drained into the new
    /// channel first, preserving original send order. The receiving task is
    /// the app's own context, so drained messages are observed strictly after
    /// this call returns.
    pub async fn register_handler(&self, app: &AppName) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;

        let mut flushed = 0usize;
        if let Some(queue) = state.queues.remove(app) {
            for delivery in queue {
                if tx.send(delivery).is_ok() {
                    flushed += 1;
                }
            }
        }

        let replaced = state.handlers.insert(app.clone(), tx).is_some();
        tracing::debug!(
            "handler_registered: app={}, replaced={}, flushed={}",
            app,
            replaced,
            flushed
        );
        rx
    }

    /// Drop the handler registration and queued messages for `app`.
    /// Part of the close path; pending requests are handled separately by
    /// [`MessageBus::cancel_requests_for`].
    pub async fn remove_app(&self, app: &AppName) {
        let mut state = self.state.lock().await;
        let had_handler = state.handlers.remove(app).is_some();
        let dropped_queue = state.queues.remove(app).map(|q| q.len()).unwrap_or(0);
        tracing::debug!(
            "app_removed_from_bus: app={}, had_handler={}, dropped_queued={}",
            app,
            had_handler,
            dropped_queue
        );
    }

    // =========================================================================
    // Point-to-Point
    // =========================================================================

    /// Send a fire-and-forget message. Unknown destinations are permitted;
    /// the message waits in the destination's bounded queue until a handler
    /// registers. The sender is never notified of queue overflow.
    pub async fn send_message(
        &self,
        from: &AppName,
        to: &AppName,
        message_type: impl Into<String>,
        data: Value,
    ) -> Result<()> {
        let message = Arc::new(Message::point_to_point(
            from.clone(),
            to.clone(),
            message_type,
            data,
            None,
        ));
        let mut state = self.state.lock().await;
        Self::route(&mut state, &self.config, to, message, None);
        Ok(())
    }

    /// Send the correlated response to a request message back to its sender.
    pub async fn respond(&self, from: &AppName, request: &Message, data: Value) -> Result<()> {
        let correlation_id = request
            .correlation_id
            .clone()
            .ok_or_else(|| Error::internal("respond called on a message without correlation id"))?;

        let to = request.from.clone();
        let message = Arc::new(Message::point_to_point(
            from.clone(),
            to.clone(),
            request.message_type.clone(),
            data,
            Some(correlation_id),
        ));
        let mut state = self.state.lock().await;
        Self::route(&mut state, &self.config, &to, message, None);
        Ok(())
    }

    /// Route one point-to-point message: resolve a pending request if this is
    /// its response, otherwise live-deliver or queue.
    fn route(
        state: &mut BusState,
        config: &BusConfig,
        to: &AppName,
        message: Arc<Message>,
        cancellation: Option<CancellationToken>,
    ) {
        // Response short-circuit: a message correlated to a pending request
        // and addressed to its requester resolves the request instead of
        // being delivered as ordinary traffic.
        if let Some(correlation_id) = &message.correlation_id {
            let is_response = state
                .pending
                .get(correlation_id)
                .map(|p| &p.requester == to)
                .unwrap_or(false);
            if is_response {
                if let Some(pending) = state.pending.remove(correlation_id) {
                    pending.timer.abort();
                    pending.cancellation.cancel();
                    let _ = pending.reply_tx.send(Ok(message.data.clone()));
                    state.stats.requests_responded += 1;
                    tracing::debug!(
                        "request_resolved: correlation={}, target={}",
                        correlation_id,
                        pending.target
                    );
                }
                return;
            }
        }

        let delivery = Delivery {
            message,
            cancellation,
        };

        if let Some(tx) = state.handlers.get(to) {
            if tx.send(delivery.clone()).is_ok() {
                state.stats.messages_sent += 1;
                return;
            }
            // Receiver dropped without re-registering; fall through to queue.
            state.handlers.remove(to);
        }

        let queue = state.queues.entry(to.clone()).or_default();
        if queue.len() >= config.queue_capacity {
            if let Some(dropped) = queue.pop_front() {
                state.stats.messages_dropped += 1;
                tracing::warn!(
                    "queue_overflow: app={}, dropped_type={}, capacity={}",
                    to,
                    dropped.message.message_type,
                    config.queue_capacity
                );
            }
        }
        queue.push_back(delivery);
        state.stats.messages_queued += 1;
    }

    // =========================================================================
    // Broadcast
    // =========================================================================

    /// Deliver a message to every instance with a registered handler,
    /// including the sender's own. Best-effort to the live set: instances
    /// without a handler are skipped, never queued. Returns delivery count.
    pub async fn broadcast(
        &self,
        from: &AppName,
        message_type: impl Into<String>,
        data: Value,
    ) -> usize {
        let message = Arc::new(Message::broadcast(from.clone(), message_type, data));
        let mut state = self.state.lock().await;

        let mut delivered = 0;
        state.handlers.retain(|_, tx| {
            let ok = tx
                .send(Delivery {
                    message: message.clone(),
                    cancellation: None,
                })
                .is_ok();
            if ok {
                delivered += 1;
            }
            // Dead channels are pruned as a side effect.
            ok
        });

        state.stats.broadcasts_sent += 1;
        tracing::debug!(
            "broadcast: from={}, type={}, delivered={}",
            message.from,
            message.message_type,
            delivered
        );
        delivered
    }

    // =========================================================================
    // Request/Response
    // =========================================================================

    /// Send a request and return a handle to its eventual resolution.
    ///
    /// The timeout defaults to `BusConfig::default_request_timeout` and is
    /// clamped to `BusConfig::max_request_timeout`. The deadline timer runs
    /// in its own task and never blocks the coordination path.
    pub async fn send_request(
        &self,
        from: &AppName,
        to: &AppName,
        message_type: impl Into<String>,
        data: Value,
        timeout: Option<Duration>,
    ) -> PendingReply {
        let timeout = timeout
            .unwrap_or(self.config.default_request_timeout)
            .min(self.config.max_request_timeout);

        let correlation_id = CorrelationId::new();
        let (reply_tx, reply_rx) = oneshot::channel();
        let cancellation = CancellationToken::new();

        let message = Arc::new(Message::point_to_point(
            from.clone(),
            to.clone(),
            message_type,
            data,
            Some(correlation_id.clone()),
        ));

        // The lock is held across the timer spawn, so the timer's first lock
        // acquisition cannot observe a missing pending entry even when the
        // timeout is zero.
        let mut state = self.state.lock().await;

        let timer = {
            let state = self.state.clone();
            let correlation_id = correlation_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let mut state = state.lock().await;
                if let Some(pending) = state.pending.remove(&correlation_id) {
                    pending.cancellation.cancel();
                    let _ = pending.reply_tx.send(Err(Error::request_timeout(format!(
                        "no response from {} within {:?}",
                        pending.target, timeout
                    ))));
                    state.stats.requests_timed_out += 1;
                    tracing::debug!(
                        "request_timed_out: correlation={}, target={}",
                        correlation_id,
                        pending.target
                    );
                }
            })
        };

        state.pending.insert(
            correlation_id.clone(),
            PendingRequest {
                requester: from.clone(),
                target: to.clone(),
                reply_tx,
                timer,
                cancellation: cancellation.clone(),
            },
        );
        state.stats.requests_started += 1;
        Self::route(&mut state, &self.config, to, message, Some(cancellation));

        PendingReply {
            correlation_id,
            rx: reply_rx,
        }
    }

    /// Resolve every pending request targeting `app` with `RequestCancelled`.
    /// Called synchronously from the close path, so no reply can arrive after
    /// the target is reported Closed. Returns the number cancelled.
    pub async fn cancel_requests_for(&self, app: &AppName) -> usize {
        let mut state = self.state.lock().await;
        let targeted: Vec<CorrelationId> = state
            .pending
            .iter()
            .filter(|(_, p)| &p.target == app)
            .map(|(id, _)| id.clone())
            .collect();

        for correlation_id in &targeted {
            if let Some(pending) = state.pending.remove(correlation_id) {
                pending.timer.abort();
                pending.cancellation.cancel();
                let _ = pending.reply_tx.send(Err(Error::request_cancelled(format!(
                    "target {} closed while request pending",
                    app
                ))));
                state.stats.requests_cancelled += 1;
            }
        }

        if !targeted.is_empty() {
            tracing::debug!("requests_cancelled: app={}, count={}", app, targeted.len());
        }
        targeted.len()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get current bus statistics.
    pub async fn stats(&self) -> BusStats {
        self.state.lock().await.stats.clone()
    }

    /// Number of outstanding requests.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    /// Number of messages queued for an unregistered destination.
    pub async fn queued_count(&self, app: &AppName) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(app)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;
    use tracing_test::traced_test;

    fn app(name: &str) -> AppName {
        AppName::must(name)
    }

    // =========================================================================
    // Point-to-Point Tests
    // =========================================================================

    #[tokio::test]
    async fn live_delivery_to_registered_handler() {
        let bus = MessageBus::default();
        let mut rx = bus.register_handler(&app("y")).await;

        assert_ok!(
            bus.send_message(&app("x"), &app("y"), "ping", json!({"n": 1}))
                .await
        );

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.message.from, app("x"));
        assert_eq!(delivery.message.message_type, "ping");
        assert_eq!(delivery.message.data, json!({"n": 1}));
        assert!(delivery.cancellation.is_none());

        let stats = bus.stats().await;
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_queued, 0);
    }

    #[tokio::test]
    async fn queued_messages_flush_in_send_order() {
        let bus = MessageBus::default();

        for n in 0..3 {
            bus.send_message(&app("x"), &app("y"), "ping", json!({ "n": n }))
                .await
                .unwrap();
        }
        assert_eq!(bus.queued_count(&app("y")).await, 3);

        let mut rx = bus.register_handler(&app("y")).await;
        assert_eq!(bus.queued_count(&app("y")).await, 0);

        for n in 0..3 {
            let delivery = rx.recv().await.unwrap();
            assert_eq!(delivery.message.data, json!({ "n": n }));
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn queue_overflow_drops_oldest_with_warning() {
        let bus = MessageBus::new(BusConfig {
            queue_capacity: 2,
            ..Default::default()
        });

        for n in 0..3 {
            bus.send_message(&app("x"), &app("y"), format!("m{n}"), json!({}))
                .await
                .unwrap();
        }

        let mut rx = bus.register_handler(&app("y")).await;
        assert_eq!(rx.recv().await.unwrap().message.message_type, "m1");
        assert_eq!(rx.recv().await.unwrap().message.message_type, "m2");

        let stats = bus.stats().await;
        assert_eq!(stats.messages_dropped, 1);
        assert!(logs_contain("queue_overflow"));
    }

    #[tokio::test]
    async fn reregistering_replaces_handler() {
        let bus = MessageBus::default();
        let mut old_rx = bus.register_handler(&app("y")).await;
        let mut new_rx = bus.register_handler(&app("y")).await;

        bus.send_message(&app("x"), &app("y"), "ping", json!({}))
            .await
            .unwrap();

        assert_eq!(new_rx.recv().await.unwrap().message.message_type, "ping");
        // Old channel's sender was dropped on replacement.
        assert!(old_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_falls_back_to_queue() {
        let bus = MessageBus::default();
        let rx = bus.register_handler(&app("y")).await;
        drop(rx);

        bus.send_message(&app("x"), &app("y"), "ping", json!({}))
            .await
            .unwrap();
        assert_eq!(bus.queued_count(&app("y")).await, 1);
    }

    // =========================================================================
    // Broadcast Tests
    // =========================================================================

    #[tokio::test]
    async fn broadcast_reaches_registered_handlers_including_sender() {
        let bus = MessageBus::default();
        let mut rx_a = bus.register_handler(&app("a")).await;
        let mut rx_b = bus.register_handler(&app("b")).await;
        // "c" has queued traffic but no handler; broadcast must skip it.
        bus.send_message(&app("a"), &app("c"), "warmup", json!({}))
            .await
            .unwrap();

        let delivered = bus.broadcast(&app("a"), "theme.changed", json!({})).await;
        assert_eq!(delivered, 2);

        assert_eq!(
            rx_a.recv().await.unwrap().message.message_type,
            "theme.changed"
        );
        assert_eq!(
            rx_b.recv().await.unwrap().message.message_type,
            "theme.changed"
        );
        // Nothing extra queued for c.
        assert_eq!(bus.queued_count(&app("c")).await, 1);
    }

    #[tokio::test]
    async fn broadcast_to_empty_live_set() {
        let bus = MessageBus::default();
        assert_eq!(bus.broadcast(&app("a"), "ping", json!({})).await, 0);
        assert_eq!(bus.stats().await.broadcasts_sent, 1);
    }

    // =========================================================================
    // Request/Response Tests
    // =========================================================================

    #[tokio::test]
    async fn request_resolves_with_response() {
        let bus = MessageBus::default();
        let mut rx = bus.register_handler(&app("y")).await;

        // Responder task: echo the question back.
        let responder = bus.clone();
        tokio::spawn(async move {
            if let Some(delivery) = rx.recv().await {
                responder
                    .respond(&app("y"), &delivery.message, json!({"answer": 42}))
                    .await
                    .unwrap();
            }
        });

        let reply = bus
            .send_request(&app("x"), &app("y"), "ask", json!({}), None)
            .await;
        let value = reply.recv().await.unwrap();
        assert_eq!(value, json!({"answer": 42}));

        let stats = bus.stats().await;
        assert_eq!(stats.requests_started, 1);
        assert_eq!(stats.requests_responded, 1);
        assert_eq!(stats.requests_timed_out, 0);
        assert_eq!(bus.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_at_deadline_exactly_once() {
        let bus = MessageBus::default();
        let mut rx = bus.register_handler(&app("y")).await;

        let start = tokio::time::Instant::now();
        let reply = bus
            .send_request(
                &app("x"),
                &app("y"),
                "ask",
                json!({}),
                Some(Duration::from_millis(2000)),
            )
            .await;

        // Target receives the request but never responds in time.
        let delivery = rx.recv().await.unwrap();
        let token = delivery.cancellation.clone().unwrap();

        let err = reply.recv().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_millis(2000));
        assert!(token.is_cancelled());

        // A late response must not produce a second resolution; it routes as
        // ordinary traffic back to the requester instead.
        bus.respond(&app("y"), &delivery.message, json!({"late": true}))
            .await
            .unwrap();
        assert_eq!(bus.queued_count(&app("x")).await, 1);

        let stats = bus.stats().await;
        assert_eq!(stats.requests_timed_out, 1);
        assert_eq!(stats.requests_responded, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_clamped_to_max() {
        let bus = MessageBus::new(BusConfig {
            max_request_timeout: Duration::from_millis(100),
            ..Default::default()
        });

        let start = tokio::time::Instant::now();
        let reply = bus
            .send_request(
                &app("x"),
                &app("y"),
                "ask",
                json!({}),
                Some(Duration::from_secs(3600)),
            )
            .await;

        let err = reply.recv().await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn zero_timeout_request_still_resolves() {
        let bus = MessageBus::default();

        // No handler for the target; the deadline timer is the only
        // resolution path and must always find the pending entry.
        let reply = bus
            .send_request(&app("x"), &app("y"), "ask", json!({}), Some(Duration::ZERO))
            .await;

        let err = tokio::time::timeout(Duration::from_secs(1), reply.recv())
            .await
            .expect("request must resolve by its deadline")
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(bus.pending_count().await, 0);
    }

    #[tokio::test]
    async fn cancel_requests_for_resolves_all_inbound() {
        let bus = MessageBus::default();

        let reply1 = bus
            .send_request(&app("x"), &app("a"), "ask", json!({}), None)
            .await;
        let reply2 = bus
            .send_request(&app("y"), &app("a"), "ask", json!({}), None)
            .await;
        let unrelated = bus
            .send_request(&app("x"), &app("b"), "ask", json!({}), None)
            .await;

        let cancelled = bus.cancel_requests_for(&app("a")).await;
        assert_eq!(cancelled, 2);

        assert!(reply1.recv().await.unwrap_err().is_cancelled());
        assert!(reply2.recv().await.unwrap_err().is_cancelled());
        assert_eq!(bus.pending_count().await, 1);

        let stats = bus.stats().await;
        assert_eq!(stats.requests_cancelled, 2);
        drop(unrelated);
    }

    #[tokio::test]
    async fn respond_requires_correlation_id() {
        let bus = MessageBus::default();
        let plain = Message::point_to_point(app("x"), app("y"), "ping", json!({}), None);
        assert!(bus.respond(&app("y"), &plain, json!({})).await.is_err());
    }

    #[tokio::test]
    async fn remove_app_drops_handler_and_queue() {
        let bus = MessageBus::default();
        let _rx = bus.register_handler(&app("a")).await;
        bus.send_message(&app("x"), &app("b"), "ping", json!({}))
            .await
            .unwrap();

        bus.remove_app(&app("a")).await;
        bus.remove_app(&app("b")).await;

        assert_eq!(bus.queued_count(&app("b")).await, 0);
        assert_eq!(bus.broadcast(&app("x"), "ping", json!({})).await, 0);
    }
}

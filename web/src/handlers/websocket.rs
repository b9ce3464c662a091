//! WebSocket endpoint for live queue updates.
//!
//! Each connection subscribes once, at connect time, to the topics its
//! caller may see and then runs two loops:
//!
//! ```text
//! Client            Reader                Writer               EventBus
//!   │                 │                     │                     │
//!   ├─ Upgrade ──────>├─ subscribe() ─────────────────────────────>│
//!   │                 │                     │<── events ──────────┤
//!   │<────────────────┼─────── {"e","d"} ───┤                     │
//!   │<────────────────┼─────── PING ────────┤ (every interval)    │
//!   ├─ any frame ────>│ (deadline reset)    │                     │
//!   │                 │                     │                     │
//!   │      silence for interval + slack     │                     │
//!   │                 ├─ unsubscribe() ───────────────────────────>│
//!   │<─ Close ────────┤                     ✕ (channel closed)    │
//! ```
//!
//! Client frames are liveness signals only; their content is ignored. The
//! reader owns teardown so it happens exactly once however the connection
//! ends: it aborts the writer before touching the sink, so a writer stuck on
//! a client that stopped reading cannot hold teardown up. The writer stops
//! on its first failed send.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::Response,
};
use futures::{
    SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use office_hours_core::RequestContext;
use office_hours_core::event::{Event, EventName};
use office_hours_core::event_bus::EventBus;
use office_hours_core::ids::QueueId;
use office_hours_core::store::{FullStore, Storage};
use office_hours_core::topic::Topic;
use office_hours_runtime::PubSub;
use office_hours_runtime::metrics::ConnectionMetrics;
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, Span, debug, info, warn};

use crate::extractors::QueueScope;
use crate::state::{AppState, HeartbeatConfig};

type Sink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Upper bound on the close handshake with a client that stopped reading.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Topics a connection opened with `ctx` receives.
///
/// Everybody gets the queue-wide broadcast. Admins get full entry and
/// appointment events, everybody else the anonymized copies, and a signed-in
/// caller also gets their personal topic.
#[must_use]
pub fn connection_topics(ctx: &RequestContext) -> Vec<Topic> {
    let queue = ctx.queue.id;
    let mut topics = vec![Topic::generic(queue)];
    if ctx.is_admin() {
        topics.push(Topic::admin(queue));
    } else {
        topics.push(Topic::non_privileged(queue));
    }
    if let Some(identity) = &ctx.identity {
        topics.push(Topic::personal(queue, identity.email.clone()));
    }
    topics
}

/// `GET /queues/:queue_id/ws`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn connect<S>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<S>>,
    q: QueueScope<S>,
) -> Response
where
    S: Storage,
    S::Tx: FullStore,
{
    let connection = Connection {
        queue: q.ctx.queue.id,
        topics: connection_topics(&q.ctx),
        bus: Arc::clone(&state.bus),
        metrics: Arc::clone(&state.metrics),
        heartbeat: state.heartbeat,
    };
    debug!(queue = %connection.queue, admin = q.ctx.is_admin(), "WebSocket connection requested");

    ws.on_upgrade(move |socket| connection.run(socket))
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hangup {
    /// The client sent a close frame.
    ClientClosed,
    /// The stream ended or failed.
    Disconnected,
    /// Nothing arrived within the heartbeat deadline.
    Timeout,
}

impl Hangup {
    const fn reason(self) -> &'static str {
        match self {
            Self::ClientClosed => "client closed",
            Self::Disconnected => "disconnected",
            Self::Timeout => "heartbeat timeout",
        }
    }
}

struct Connection {
    queue: QueueId,
    topics: Vec<Topic>,
    bus: Arc<PubSub>,
    metrics: Arc<ConnectionMetrics>,
    heartbeat: HeartbeatConfig,
}

impl Connection {
    async fn run(self, socket: WebSocket) {
        let span = tracing::info_span!(
            "websocket",
            queue = %self.queue,
            connection = tracing::field::Empty,
        );
        self.serve(socket).instrument(span).await;
    }

    async fn serve(self, socket: WebSocket) {
        let subscription = match self.bus.subscribe(&self.topics).await {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!(error = %error, "Subscribe failed, dropping connection");
                return;
            }
        };
        Span::current().record("connection", tracing::field::display(subscription.id));

        let opened = Instant::now();
        self.metrics.connection_opened(self.queue);
        info!(topics = self.topics.len(), "WebSocket connection established");

        let (sink, stream) = socket.split();
        let sink: Sink = Arc::new(Mutex::new(sink));

        let writer = tokio::spawn(
            write_loop(
                Arc::clone(&sink),
                subscription.events,
                self.heartbeat.interval,
                self.queue,
                Arc::clone(&self.metrics),
            )
            .instrument(Span::current()),
        );

        let hangup = read_loop(stream, self.heartbeat.deadline()).await;

        // Teardown: unsubscribe, stop the writer, close, bookkeeping.
        if !self.bus.unsubscribe(subscription.id).await {
            warn!("Subscription was already gone at teardown");
        }
        writer.abort();
        if let Err(error) = writer.await {
            if !error.is_cancelled() {
                warn!(error = %error, "WebSocket writer failed");
            }
        }
        if tokio::time::timeout(CLOSE_TIMEOUT, close(&sink, hangup))
            .await
            .is_err()
        {
            debug!("Close handshake timed out");
        }

        let lifetime = opened.elapsed();
        self.metrics.connection_closed(self.queue, lifetime);
        info!(
            reason = hangup.reason(),
            lifetime_ms = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX),
            "WebSocket connection closed"
        );
    }
}

/// Send the close frame and shut the sink.
async fn close(sink: &Sink, hangup: Hangup) {
    let mut sink = sink.lock().await;
    let frame = CloseFrame {
        code: if hangup == Hangup::Timeout {
            close_code::POLICY
        } else {
            close_code::NORMAL
        },
        reason: hangup.reason().into(),
    };
    if let Err(error) = sink.send(Message::Close(Some(frame))).await {
        debug!(error = %error, "Close frame not delivered");
    }
    if let Err(error) = sink.close().await {
        debug!(error = %error, "WebSocket sink close failed");
    }
}

/// Wait for client frames until the deadline passes without one.
async fn read_loop(mut stream: SplitStream<WebSocket>, deadline: Duration) -> Hangup {
    loop {
        match tokio::time::timeout(deadline, stream.next()).await {
            Ok(Some(Ok(Message::Close(_)))) => return Hangup::ClientClosed,
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(error))) => {
                debug!(error = %error, "WebSocket read failed");
                return Hangup::Disconnected;
            }
            Ok(None) => return Hangup::Disconnected,
            Err(_) => return Hangup::Timeout,
        }
    }
}

/// Forward bus events and send a PING every `interval`.
async fn write_loop(
    sink: Sink,
    mut events: mpsc::Receiver<Arc<Event>>,
    interval: Duration,
    queue: QueueId,
    metrics: Arc<ConnectionMetrics>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ping = Arc::new(Event::bare(EventName::Ping));

    loop {
        let (event, from_bus) = tokio::select! {
            _ = ticker.tick() => (Arc::clone(&ping), false),
            received = events.recv() => match received {
                Some(event) => (event, true),
                None => break,
            },
        };

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(error) => {
                warn!(error = %error, event = event.name.as_str(), "Failed to serialize event");
                continue;
            }
        };

        if let Err(error) = sink.lock().await.send(Message::Text(frame)).await {
            debug!(error = %error, "WebSocket write failed, writer stopping");
            break;
        }

        if from_bus {
            metrics.event_sent(queue, event.name);
            debug!(event = event.name.as_str(), "Event sent");
        }
    }
}

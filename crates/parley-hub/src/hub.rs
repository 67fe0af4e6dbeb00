//! The fan-out hub.
//!
//! Holds the session registry, the per-channel subscription sets and a
//! per-user index. Publishing never blocks: a subscriber whose queue is
//! full is disconnected rather than slowing anyone else down. Dead
//! sessions discovered during a fan-out are collected first and removed
//! after the iteration, so the indexes are never mutated mid-walk.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use parley_channel::EventSink;
use parley_core::{ChannelEvent, ChannelId, Message, NotificationData};

use crate::error::{HubError, Result};
use crate::frames::{Frame, FrameKind, InboundMessage};
use crate::session::{Session, SessionId};

/// Tunables for the hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound queue capacity per session.
    pub buffer_capacity: usize,

    /// Maximum inbound frame size in bytes.
    pub max_message_bytes: usize,

    /// Heartbeat interval. Must be below `pong_wait`.
    pub ping_period: Duration,

    /// How long a silent session survives before teardown.
    pub pong_wait: Duration,

    /// How long shutdown waits for outbound queues to drain.
    pub shutdown_drain: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            max_message_bytes: 512,
            ping_period: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            shutdown_drain: Duration::from_secs(5),
        }
    }
}

struct HubInner {
    sessions: HashMap<SessionId, Session>,
    channel_subscribers: HashMap<ChannelId, HashSet<SessionId>>,
    user_index: HashMap<String, HashSet<SessionId>>,
}

/// The realtime fan-out hub.
pub struct Hub {
    config: HubConfig,
    inner: RwLock<HubInner>,
    next_session: AtomicU64,
    accepting: AtomicBool,
}

impl Hub {
    /// Create a hub with the given configuration.
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(HubInner {
                sessions: HashMap::new(),
                channel_subscribers: HashMap::new(),
                user_index: HashMap::new(),
            }),
            next_session: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Register a subscriber bound to a user.
    ///
    /// Returns the session id and the receive side of its bounded
    /// outbound queue; the transport layer drains the receiver.
    pub fn connect(&self, user_id: &str) -> Result<(SessionId, mpsc::Receiver<Frame>)> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(HubError::ShuttingDown);
        }

        let id = SessionId(self.next_session.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = mpsc::channel(self.config.buffer_capacity);

        let mut inner = self.inner.write().expect("hub lock poisoned");
        inner
            .sessions
            .insert(id, Session::new(user_id.to_string(), sender));
        inner
            .user_index
            .entry(user_id.to_string())
            .or_default()
            .insert(id);

        tracing::info!(session = %id, user = user_id, "session connected");
        Ok((id, receiver))
    }

    /// Tear down a session, removing it from every index.
    pub fn disconnect(&self, id: SessionId) {
        let mut inner = self.inner.write().expect("hub lock poisoned");
        remove_session(&mut inner, id);
    }

    /// Subscribe a session to a channel's traffic.
    pub fn subscribe(&self, id: SessionId, channel_id: ChannelId) -> Result<()> {
        let mut inner = self.inner.write().expect("hub lock poisoned");
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(HubError::UnknownSession(id))?;
        session.subscriptions.insert(channel_id);
        inner
            .channel_subscribers
            .entry(channel_id)
            .or_default()
            .insert(id);
        tracing::debug!(session = %id, channel = %channel_id, "subscribed");
        Ok(())
    }

    /// Remove a session's subscription to a channel.
    pub fn unsubscribe(&self, id: SessionId, channel_id: ChannelId) -> Result<()> {
        let mut inner = self.inner.write().expect("hub lock poisoned");
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(HubError::UnknownSession(id))?;
        session.subscriptions.remove(&channel_id);
        if let Some(subscribers) = inner.channel_subscribers.get_mut(&channel_id) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                inner.channel_subscribers.remove(&channel_id);
            }
        }
        tracing::debug!(session = %id, channel = %channel_id, "unsubscribed");
        Ok(())
    }

    /// Number of connected sessions.
    pub fn connection_count(&self) -> usize {
        self.inner.read().expect("hub lock poisoned").sessions.len()
    }

    /// Number of sessions subscribed to a channel.
    pub fn subscriber_count(&self, channel_id: &ChannelId) -> usize {
        self.inner
            .read()
            .expect("hub lock poisoned")
            .channel_subscribers
            .get(channel_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────

    /// Fan a channel event out to every subscriber of that channel.
    pub fn publish_channel_event(&self, event: &ChannelEvent) {
        let data = serde_json::to_value(event).unwrap_or(Value::Null);
        let frame = Frame::new(FrameKind::ChannelEvent, Some(event.channel_id), data);
        self.fanout_channel(event.channel_id, frame);
    }

    /// Fan a channel message out along the same path.
    pub fn publish_channel_message(&self, message: &Message) {
        let data = serde_json::to_value(message).unwrap_or(Value::Null);
        let frame = Frame::new(FrameKind::ChannelMessage, Some(message.channel_id), data);
        self.fanout_channel(message.channel_id, frame);
    }

    /// Deliver a notification to every session bound to a user.
    pub fn publish_to_user(&self, user_id: &str, notification: &NotificationData) {
        let data = serde_json::to_value(notification).unwrap_or(Value::Null);
        let frame = Frame::new(FrameKind::Notification, None, data);

        let mut dead = Vec::new();
        {
            let inner = self.inner.read().expect("hub lock poisoned");
            if let Some(ids) = inner.user_index.get(user_id) {
                for id in ids {
                    if let Some(session) = inner.sessions.get(id) {
                        if !session.enqueue(frame.clone()) {
                            dead.push(*id);
                        }
                    }
                }
            }
        }
        self.drop_sessions(&dead);
    }

    /// Deliver to every subscriber of a channel, collecting saturated
    /// sessions for removal after the walk.
    fn fanout_channel(&self, channel_id: ChannelId, frame: Frame) {
        let mut dead = Vec::new();
        {
            let inner = self.inner.read().expect("hub lock poisoned");
            if let Some(subscribers) = inner.channel_subscribers.get(&channel_id) {
                for id in subscribers {
                    if let Some(session) = inner.sessions.get(id) {
                        if !session.enqueue(frame.clone()) {
                            dead.push(*id);
                        }
                    }
                }
            }
        }
        self.drop_sessions(&dead);
    }

    /// Remove saturated or closed sessions from every index.
    fn drop_sessions(&self, ids: &[SessionId]) {
        if ids.is_empty() {
            return;
        }
        let mut inner = self.inner.write().expect("hub lock poisoned");
        for id in ids {
            tracing::info!(session = %id, "dropping slow or closed session");
            remove_session(&mut inner, *id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound control protocol
    // ─────────────────────────────────────────────────────────────────────

    /// Handle a raw inbound frame from a session's transport.
    ///
    /// Oversize frames close the session. Any inbound traffic refreshes
    /// liveness. Responses are enqueued on the session's own queue.
    pub fn handle_inbound(&self, id: SessionId, raw: &str) -> Result<()> {
        if raw.len() > self.config.max_message_bytes {
            self.disconnect(id);
            return Err(HubError::FrameTooLarge {
                size: raw.len(),
                limit: self.config.max_message_bytes,
            });
        }

        self.touch(id)?;

        let message: InboundMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "ignoring malformed frame");
                return Ok(());
            }
        };

        match message.kind.as_str() {
            "subscribe" => match message.channel_id {
                Some(channel_id) => {
                    self.subscribe(id, channel_id)?;
                    self.respond(
                        id,
                        Frame::new(
                            FrameKind::Subscribed,
                            Some(channel_id),
                            json!({ "channel_id": channel_id }),
                        ),
                    );
                }
                None => self.respond_error(id, "missing_channel_id", "subscribe needs a channel_id"),
            },
            "unsubscribe" => match message.channel_id {
                Some(channel_id) => {
                    self.unsubscribe(id, channel_id)?;
                    self.respond(
                        id,
                        Frame::new(
                            FrameKind::Unsubscribed,
                            Some(channel_id),
                            json!({ "channel_id": channel_id }),
                        ),
                    );
                }
                None => {
                    self.respond_error(id, "missing_channel_id", "unsubscribe needs a channel_id")
                }
            },
            "ping" => {
                self.respond(
                    id,
                    Frame::new(FrameKind::Pong, None, json!({ "timestamp": chrono::Utc::now() })),
                );
            }
            "get_subscriptions" => {
                let channels: Vec<String> = {
                    let inner = self.inner.read().expect("hub lock poisoned");
                    inner
                        .sessions
                        .get(&id)
                        .map(|s| s.subscriptions.iter().map(ChannelId::to_hex).collect())
                        .unwrap_or_default()
                };
                self.respond(
                    id,
                    Frame::new(FrameKind::Subscriptions, None, json!({ "channels": channels })),
                );
            }
            other => {
                self.respond_error(
                    id,
                    "unknown_message_type",
                    &format!("Unknown message type: {}", other),
                );
            }
        }

        Ok(())
    }

    /// Record a transport-level pong, refreshing liveness.
    pub fn record_pong(&self, id: SessionId) -> Result<()> {
        self.touch(id)
    }

    fn touch(&self, id: SessionId) -> Result<()> {
        let mut inner = self.inner.write().expect("hub lock poisoned");
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(HubError::UnknownSession(id))?;
        session.last_seen = Instant::now();
        Ok(())
    }

    fn respond(&self, id: SessionId, frame: Frame) {
        let dead = {
            let inner = self.inner.read().expect("hub lock poisoned");
            match inner.sessions.get(&id) {
                Some(session) => !session.enqueue(frame),
                None => false,
            }
        };
        if dead {
            self.drop_sessions(&[id]);
        }
    }

    fn respond_error(&self, id: SessionId, error_type: &str, message: &str) {
        self.respond(
            id,
            Frame::new(
                FrameKind::Error,
                None,
                json!({ "type": error_type, "message": message }),
            ),
        );
    }

    // ─────────────────────────────────────────────────────────────────────
    // Liveness
    // ─────────────────────────────────────────────────────────────────────

    /// One heartbeat round: tear down sessions past the pong deadline,
    /// ping everyone else.
    pub fn heartbeat_tick(&self) {
        let now = Instant::now();
        let ping = Frame::new(FrameKind::Ping, None, json!({}));

        let mut dead = Vec::new();
        {
            let inner = self.inner.read().expect("hub lock poisoned");
            for (id, session) in &inner.sessions {
                if session.is_stale(now, self.config.pong_wait) {
                    tracing::info!(session = %id, "session missed pong deadline");
                    dead.push(*id);
                } else if !session.enqueue(ping.clone()) {
                    dead.push(*id);
                }
            }
        }
        self.drop_sessions(&dead);
    }

    /// Spawn the heartbeat loop.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(hub.config.ping_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                hub.heartbeat_tick();
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────

    /// Graceful shutdown: stop accepting sessions, broadcast a shutdown
    /// frame, wait for outbound queues to drain (bounded by the drain
    /// deadline), then force-close everything.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);

        let frame = Frame::new(FrameKind::Shutdown, None, json!({}));
        let mut dead = Vec::new();
        {
            let inner = self.inner.read().expect("hub lock poisoned");
            for (id, session) in &inner.sessions {
                if !session.enqueue(frame.clone()) {
                    dead.push(*id);
                }
            }
        }
        self.drop_sessions(&dead);

        let deadline = Instant::now() + self.config.shutdown_drain;
        loop {
            let drained = {
                let inner = self.inner.read().expect("hub lock poisoned");
                inner
                    .sessions
                    .values()
                    .all(|s| s.sender.capacity() == s.sender.max_capacity())
            };
            if drained || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut inner = self.inner.write().expect("hub lock poisoned");
        let count = inner.sessions.len();
        inner.sessions.clear();
        inner.channel_subscribers.clear();
        inner.user_index.clear();
        tracing::info!(sessions = count, "hub shut down");
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// The hub is the intended sink for manager-committed traffic.
impl EventSink for Hub {
    fn channel_event(&self, event: &ChannelEvent) {
        self.publish_channel_event(event);
    }

    fn channel_message(&self, message: &Message) {
        self.publish_channel_message(message);
    }
}

/// Remove a session and all its index entries. The caller holds the
/// write lock.
fn remove_session(inner: &mut HubInner, id: SessionId) {
    let Some(session) = inner.sessions.remove(&id) else {
        return;
    };

    for channel_id in &session.subscriptions {
        if let Some(subscribers) = inner.channel_subscribers.get_mut(channel_id) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                inner.channel_subscribers.remove(channel_id);
            }
        }
    }

    if let Some(ids) = inner.user_index.get_mut(&session.user_id) {
        ids.remove(&id);
        if ids.is_empty() {
            inner.user_index.remove(&session.user_id);
        }
    }
    // dropping the session drops the sender, which closes the receiver
}

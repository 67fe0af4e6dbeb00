//! Subscriber sessions.
//!
//! A session is one connected subscriber: a bounded outbound queue, the
//! user it authenticated as, its channel subscriptions and a liveness
//! timestamp. The hub owns the send side; the transport layer drains
//! the receive side.

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use tokio::sync::mpsc;

use parley_core::ChannelId;

use crate::frames::Frame;

/// Identifies one connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Hub-side state for one subscriber.
pub(crate) struct Session {
    pub(crate) user_id: String,
    pub(crate) sender: mpsc::Sender<Frame>,
    pub(crate) subscriptions: HashSet<ChannelId>,
    pub(crate) last_seen: Instant,
}

impl Session {
    pub(crate) fn new(user_id: String, sender: mpsc::Sender<Frame>) -> Self {
        Self {
            user_id,
            sender,
            subscriptions: HashSet::new(),
            last_seen: Instant::now(),
        }
    }

    /// Enqueue without blocking. `false` means the queue is full or the
    /// receiver is gone, and the session must be dropped.
    pub(crate) fn enqueue(&self, frame: Frame) -> bool {
        self.sender.try_send(frame).is_ok()
    }

    /// Has this session missed its pong deadline?
    pub(crate) fn is_stale(&self, now: Instant, pong_wait: std::time::Duration) -> bool {
        now.duration_since(self.last_seen) > pong_wait
    }
}

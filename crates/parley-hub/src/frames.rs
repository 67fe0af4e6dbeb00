//! The realtime frame envelope and inbound control messages.
//!
//! Every outbound payload travels in the same envelope:
//! `{ "type": <tag>, "channel_id": <id?>, "data": <payload>,
//!    "timestamp": <iso8601> }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_core::ChannelId;

/// Outbound frame tags.
///
/// `Ping` is the heartbeat; transport adapters that have a native ping
/// control frame may translate it instead of delivering it as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    ChannelEvent,
    ChannelMessage,
    Notification,
    Subscribed,
    Unsubscribed,
    Pong,
    Subscriptions,
    Error,
    Shutdown,
    Ping,
}

/// The outbound envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,

    pub data: Value,

    pub timestamp: DateTime<Utc>,
}

impl Frame {
    /// Build a frame stamped with the current time.
    pub fn new(kind: FrameKind, channel_id: Option<ChannelId>, data: Value) -> Self {
        Self {
            kind,
            channel_id,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// An inbound client control message, before dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub channel_id: Option<ChannelId>,

    #[serde(default)]
    pub data: Value,
}

//! The seam between the channel manager and whatever fans events out.
//!
//! The manager publishes through this trait after a mutation commits.
//! Publishing is best-effort and must never block or fail the mutation;
//! a realtime hub is the intended implementor.

use parley_core::{ChannelEvent, Message};

/// A non-blocking consumer of committed channel traffic.
pub trait EventSink: Send + Sync {
    /// A channel event was committed.
    fn channel_event(&self, event: &ChannelEvent);

    /// A message was appended to a channel's log.
    fn channel_message(&self, message: &Message);
}

/// A sink that drops everything. Useful in tests and batch tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn channel_event(&self, _event: &ChannelEvent) {}
    fn channel_message(&self, _message: &Message) {}
}

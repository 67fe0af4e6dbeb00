//! Store trait: the abstract interface for channel persistence.
//!
//! The trait keeps the channel manager storage-agnostic. The mandated
//! implementation is in-memory; persistent backends may be substituted
//! behind the same interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parley_core::{
    Channel, ChannelBackup, ChannelEvent, ChannelFilter, ChannelId, ChannelStatistics, Message,
};

use crate::error::Result;

/// Async interface for channel persistence.
///
/// # Design Notes
///
/// - **Ownership**: the store owns the canonical channel objects. Every
///   getter returns an owned deep copy; mutating a returned value never
///   changes subsequent reads.
/// - **Idempotent upserts**: `save_channel` is an upsert keyed by id.
/// - **Cascading delete**: `delete_channel` removes the channel, its
///   message log, its event log and its backup atomically.
/// - **Expiry**: `cleanup_expired` transitions every overdue channel to
///   Closed exactly once; `expired_channels` / `expire_channel` expose
///   the same sweep one channel at a time so a caller can serialize it
///   with its own per-channel locks.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────
    // Channel Operations
    // ─────────────────────────────────────────────────────────────────────

    /// Insert or replace a channel.
    async fn save_channel(&self, channel: &Channel) -> Result<()>;

    /// Get a channel by id, as an owned copy.
    async fn get_channel(&self, id: &ChannelId) -> Result<Channel>;

    /// Remove a channel together with its messages, events and backup.
    async fn delete_channel(&self, id: &ChannelId) -> Result<()>;

    /// List channels matching the filter, applying offset/limit.
    ///
    /// Returns the page plus the total number of matches before paging.
    /// Pages are ordered by creation time.
    async fn list_channels(&self, filter: &ChannelFilter) -> Result<(Vec<Channel>, usize)>;

    /// Number of stored channels.
    async fn channel_count(&self) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────
    // Message Log
    // ─────────────────────────────────────────────────────────────────────

    /// Append to a channel's message log. The channel must exist.
    async fn append_message(&self, message: &Message) -> Result<()>;

    /// Full message log, chronological.
    async fn get_messages(&self, id: &ChannelId) -> Result<Vec<Message>>;

    /// Number of messages logged for a channel.
    async fn message_count(&self, id: &ChannelId) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────
    // Event Log
    // ─────────────────────────────────────────────────────────────────────

    /// Append to a channel's event log.
    async fn append_event(&self, event: &ChannelEvent) -> Result<()>;

    /// Full event log, chronological.
    async fn get_events(&self, id: &ChannelId) -> Result<Vec<ChannelEvent>>;

    // ─────────────────────────────────────────────────────────────────────
    // Backup / Recovery
    // ─────────────────────────────────────────────────────────────────────

    /// Snapshot a channel with its message and event logs.
    async fn create_backup(&self, id: &ChannelId) -> Result<ChannelBackup>;

    /// Restore a channel from its latest backup.
    async fn restore_backup(&self, id: &ChannelId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────
    // Expiry
    // ─────────────────────────────────────────────────────────────────────

    /// Ids of channels past their TTL that are not yet Closed.
    async fn expired_channels(&self, now: DateTime<Utc>) -> Result<Vec<ChannelId>>;

    /// Transition one overdue channel to Closed.
    ///
    /// Returns the `channel_expired` event when a transition happened,
    /// `None` when the channel is not overdue or already Closed.
    /// Idempotent.
    async fn expire_channel(&self, id: &ChannelId, now: DateTime<Utc>)
        -> Result<Option<ChannelEvent>>;

    /// Sweep all channels: expire every overdue one, appending a
    /// `channel_expired` event each. Returns how many were transitioned.
    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────
    // Statistics
    // ─────────────────────────────────────────────────────────────────────

    /// Aggregate counters over all stored channels.
    async fn statistics(&self) -> Result<ChannelStatistics>;
}

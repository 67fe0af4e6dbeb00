//! In-memory implementation of the Store trait.
//!
//! The mandated backend: a single lock over plain maps. Every returned
//! object is an owned clone, and the entity types are trees, so clones
//! are deep copies and the canonical state never leaks by reference.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use parley_core::{
    Channel, ChannelBackup, ChannelEvent, ChannelFilter, ChannelId, ChannelState,
    ChannelStatistics, Message,
};

use crate::error::{Result, StoreError};
use crate::traits::Store;

/// In-memory store. All data is lost when the store is dropped.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    channels: HashMap<ChannelId, Channel>,
    messages: HashMap<ChannelId, Vec<Message>>,
    events: HashMap<ChannelId, Vec<ChannelEvent>>,
    backups: HashMap<ChannelId, ChannelBackup>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                channels: HashMap::new(),
                messages: HashMap::new(),
                events: HashMap::new(),
                backups: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the expiry event appended when a channel's TTL lapses.
fn expired_event(id: ChannelId, now: DateTime<Utc>) -> ChannelEvent {
    ChannelEvent::new(
        id,
        "channel_expired",
        json!({ "expired_at": now, "reason": "ttl" }),
        now,
    )
}

/// Expire a single channel in place. Returns the event if a transition
/// happened.
fn expire_in_place(
    inner: &mut MemoryStoreInner,
    id: &ChannelId,
    now: DateTime<Utc>,
) -> Option<ChannelEvent> {
    let channel = inner.channels.get_mut(id)?;
    if channel.state == ChannelState::Closed || !channel.has_expired(now) {
        return None;
    }
    channel.state = ChannelState::Closed;
    channel.updated_at = now;

    let event = expired_event(*id, now);
    inner.events.entry(*id).or_default().push(event.clone());
    Some(event)
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_channel(&self, channel: &Channel) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.channels.insert(channel.id, channel.clone());
        Ok(())
    }

    async fn get_channel(&self, id: &ChannelId) -> Result<Channel> {
        let inner = self.inner.read().unwrap();
        inner
            .channels
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn delete_channel(&self, id: &ChannelId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if inner.channels.remove(id).is_none() {
            return Err(StoreError::NotFound(*id));
        }
        inner.messages.remove(id);
        inner.events.remove(id);
        inner.backups.remove(id);
        Ok(())
    }

    async fn list_channels(&self, filter: &ChannelFilter) -> Result<(Vec<Channel>, usize)> {
        let inner = self.inner.read().unwrap();

        let mut matched: Vec<Channel> = inner
            .channels
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matched.sort_by_key(|c| (c.created_at, c.id));

        let total = matched.len();
        let page: Vec<Channel> = matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        Ok((page, total))
    }

    async fn channel_count(&self) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner.channels.len())
    }

    async fn append_message(&self, message: &Message) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.channels.contains_key(&message.channel_id) {
            return Err(StoreError::NotFound(message.channel_id));
        }
        inner
            .messages
            .entry(message.channel_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_messages(&self, id: &ChannelId) -> Result<Vec<Message>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.messages.get(id).cloned().unwrap_or_default())
    }

    async fn message_count(&self, id: &ChannelId) -> Result<usize> {
        let inner = self.inner.read().unwrap();
        Ok(inner.messages.get(id).map(Vec::len).unwrap_or(0))
    }

    async fn append_event(&self, event: &ChannelEvent) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .events
            .entry(event.channel_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn get_events(&self, id: &ChannelId) -> Result<Vec<ChannelEvent>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.events.get(id).cloned().unwrap_or_default())
    }

    async fn create_backup(&self, id: &ChannelId) -> Result<ChannelBackup> {
        let mut inner = self.inner.write().unwrap();
        let channel = inner
            .channels
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))?;

        let backup = ChannelBackup {
            channel,
            messages: inner.messages.get(id).cloned().unwrap_or_default(),
            events: inner.events.get(id).cloned().unwrap_or_default(),
            backup_at: Utc::now(),
        };
        inner.backups.insert(*id, backup.clone());
        Ok(backup)
    }

    async fn restore_backup(&self, id: &ChannelId) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let backup = inner
            .backups
            .get(id)
            .cloned()
            .ok_or(StoreError::BackupNotFound(*id))?;

        inner.channels.insert(*id, backup.channel);
        inner.messages.insert(*id, backup.messages);
        inner.events.insert(*id, backup.events);
        Ok(())
    }

    async fn expired_channels(&self, now: DateTime<Utc>) -> Result<Vec<ChannelId>> {
        let inner = self.inner.read().unwrap();
        let mut ids: Vec<ChannelId> = inner
            .channels
            .values()
            .filter(|c| c.state != ChannelState::Closed && c.has_expired(now))
            .map(|c| c.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn expire_channel(
        &self,
        id: &ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Option<ChannelEvent>> {
        let mut inner = self.inner.write().unwrap();
        if !inner.channels.contains_key(id) {
            return Err(StoreError::NotFound(*id));
        }
        Ok(expire_in_place(&mut inner, id, now))
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        let overdue: Vec<ChannelId> = inner
            .channels
            .values()
            .filter(|c| c.state != ChannelState::Closed && c.has_expired(now))
            .map(|c| c.id)
            .collect();

        let mut count = 0;
        for id in overdue {
            if expire_in_place(&mut inner, &id, now).is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn statistics(&self) -> Result<ChannelStatistics> {
        let inner = self.inner.read().unwrap();

        let mut stats = ChannelStatistics {
            total_channels: inner.channels.len() as u64,
            ..ChannelStatistics::default()
        };

        let mut closed_lifetime_hours = 0.0;
        let mut closed_count = 0u64;

        for channel in inner.channels.values() {
            *stats.channels_by_state.entry(channel.state).or_default() += 1;

            match channel.state {
                ChannelState::Open => stats.active_channels += 1,
                ChannelState::Closed => {
                    stats.closed_channels += 1;
                    let lifetime = channel.updated_at - channel.created_at;
                    closed_lifetime_hours += lifetime.num_milliseconds() as f64 / 3_600_000.0;
                    closed_count += 1;
                }
                _ => {}
            }

            for participant in &channel.participants {
                *stats
                    .participants_by_role
                    .entry(participant.role)
                    .or_default() += 1;
            }
        }

        if closed_count > 0 {
            stats.average_lifetime_hours = closed_lifetime_hours / closed_count as f64;
        }

        for messages in inner.messages.values() {
            for message in messages {
                *stats.messages_by_type.entry(message.kind).or_default() += 1;
            }
        }

        Ok(stats)
    }
}

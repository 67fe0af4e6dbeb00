//! The channel manager: the state machine at the heart of the
//! coordinator.
//!
//! ```text
//! Opening ──accept──► Open ──update──► Open
//!    │                  │
//!    │                  ├─close(cooperative)──► Closing ──counter-sign──► Closed
//!    │                  ├─close(force)────────► Closed
//!    │                  ├─dispute─────────────► Disputed
//!    │                  └─expiry──────────────► Closed
//!    └─expiry──────────► Closed
//! ```
//!
//! Every mutation runs under that channel's own mutex: validate, mutate,
//! persist, then emit. Readers skip the lock and observe store
//! snapshots. A global lock exists only to look up per-channel locks and
//! to gate the channel-count cap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

use parley_core::{
    accept_bytes, Access, Address, Channel, ChannelAcceptRequest, ChannelCloseRequest,
    ChannelEvent, ChannelFilter, ChannelId, ChannelInfoResponse, ChannelListResponse,
    ChannelOpenRequest, ChannelState, ChannelStatistics, Message, MessageKind, StateUpdate,
    StateUpdateResponse, ValidationError, Validator,
};
use parley_store::Store;

use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::sink::EventSink;

/// Manages every channel's lifecycle.
pub struct ChannelManager<S: Store> {
    store: Arc<S>,
    validator: Validator,
    config: ChannelConfig,
    locks: StdMutex<HashMap<ChannelId, Arc<AsyncMutex<()>>>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl<S: Store + 'static> ChannelManager<S> {
    /// Create a manager over a store.
    pub fn new(store: S, config: ChannelConfig) -> Self {
        let validator = Validator::new(config.max_data_bytes, config.burst_threshold);
        Self {
            store: Arc::new(store),
            validator,
            config,
            locks: StdMutex::new(HashMap::new()),
            sink: None,
        }
    }

    /// Attach an event sink (a realtime hub, typically).
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The validator, for callers that pre-check requests.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle operations
    // ─────────────────────────────────────────────────────────────────────

    /// Create a channel in Opening state.
    pub async fn create_channel(&self, request: ChannelOpenRequest) -> Result<Channel> {
        self.validator.validate_channel_creation(&request)?;

        if self.store.channel_count().await? >= self.config.max_channels {
            return Err(ChannelError::Capacity(format!(
                "maximum number of channels reached ({})",
                self.config.max_channels
            )));
        }

        let now = Utc::now();
        let hours = request
            .expiry_hours
            .unwrap_or(self.config.default_expiry_hours);
        let ttl = Duration::milliseconds((hours * 3_600_000.0) as i64);

        let channel = Channel {
            id: ChannelId::random(),
            participants: [request.participant_a, request.participant_b],
            state: ChannelState::Opening,
            nonce: 0,
            balance: HashMap::new(),
            data: request.initial_data,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
            chain_tx: None,
            closing_initiator: None,
        };

        self.store.save_channel(&channel).await?;

        self.emit(
            channel.id,
            "channel_created",
            json!({
                "participants": [
                    channel.proposer().address,
                    channel.acceptor().address,
                ],
                "expires_at": channel.expires_at,
            }),
        )
        .await;

        Ok(channel)
    }

    /// Accept a channel in Opening state. The signer must be the
    /// counterparty, not the proposer, and must sign the canonical
    /// accept payload.
    pub async fn accept_channel(&self, request: ChannelAcceptRequest) -> Result<Channel> {
        let lock = self.channel_lock(&request.channel_id);
        let _guard = lock.lock().await;

        let mut channel = self.store.get_channel(&request.channel_id).await?;
        if channel.state != ChannelState::Opening {
            return Err(ChannelError::State {
                state: channel.state,
                operation: "accept",
            });
        }
        if request.signature.address == channel.proposer().address {
            return Err(ValidationError::ProposerCannotAccept.into());
        }

        let payload = accept_bytes(&channel.id);
        self.validator
            .validate_participant_signature(&payload, &request.signature, &channel)?;

        channel.state = ChannelState::Open;
        channel.updated_at = Utc::now();
        self.store.save_channel(&channel).await?;

        self.emit(
            channel.id,
            "channel_accepted",
            json!({ "accepted_by": request.signature.address }),
        )
        .await;

        Ok(channel)
    }

    /// Apply a signed state update to an Open channel.
    ///
    /// The nonce must be exactly `channel.nonce + 1`; the patch merges
    /// into the channel data last-writer-wins.
    pub async fn update_state(&self, update: StateUpdate) -> Result<StateUpdateResponse> {
        let lock = self.channel_lock(&update.channel_id);
        let _guard = lock.lock().await;

        let mut channel = self.store.get_channel(&update.channel_id).await?;
        if channel.state != ChannelState::Open {
            return Err(ChannelError::State {
                state: channel.state,
                operation: "update",
            });
        }

        let now = Utc::now();
        if channel.has_expired(now) {
            return Err(ChannelError::Expired(channel.id));
        }

        self.validator.validate_state_update(&update, &channel)?;

        channel.nonce += 1;
        for (key, value) in &update.data {
            channel.data.insert(key.clone(), value.clone());
        }
        channel.updated_at = now;
        self.store.save_channel(&channel).await?;

        self.emit(
            channel.id,
            "state_updated",
            json!({ "nonce": channel.nonce, "data": Value::Object(update.data) }),
        )
        .await;

        Ok(StateUpdateResponse {
            channel_id: channel.id,
            nonce: channel.nonce,
            updated_at: channel.updated_at,
            success: true,
        })
    }

    /// Close a channel.
    ///
    /// Cooperative close moves the channel to Closing; a close by the
    /// *other* participant while Closing counter-signs it to Closed.
    /// Force close goes straight to Closed. Every path requires a valid
    /// participant signature over the canonical close payload.
    pub async fn close_channel(&self, request: ChannelCloseRequest) -> Result<Channel> {
        let lock = self.channel_lock(&request.channel_id);
        let _guard = lock.lock().await;

        let mut channel = self.store.get_channel(&request.channel_id).await?;
        if channel.state == ChannelState::Closed {
            return Err(ChannelError::State {
                state: channel.state,
                operation: "close",
            });
        }

        let now = Utc::now();
        self.validator
            .validate_close(&channel, &request.signature, request.timestamp, now)?;

        let signer = request.signature.address;

        if request.force {
            channel.state = ChannelState::Closed;
            channel.updated_at = now;
            self.store.save_channel(&channel).await?;
            self.emit(
                channel.id,
                "channel_closed",
                json!({ "force": true, "closed_by": signer }),
            )
            .await;
            return Ok(channel);
        }

        match (channel.state, channel.closing_initiator) {
            (ChannelState::Closing, Some(initiator)) if initiator != signer => {
                channel.state = ChannelState::Closed;
                channel.updated_at = now;
                self.store.save_channel(&channel).await?;
                self.emit(
                    channel.id,
                    "channel_closed",
                    json!({ "force": false, "closed_by": signer }),
                )
                .await;
            }
            (ChannelState::Closing, _) => {
                return Err(ChannelError::State {
                    state: ChannelState::Closing,
                    operation: "close",
                });
            }
            _ => {
                channel.state = ChannelState::Closing;
                channel.closing_initiator = Some(signer);
                channel.updated_at = now;
                self.store.save_channel(&channel).await?;
                self.emit(
                    channel.id,
                    "channel_closing",
                    json!({ "force": false, "initiated_by": signer }),
                )
                .await;
            }
        }

        Ok(channel)
    }

    /// Append a message to an Open channel's log, returning it as
    /// appended.
    ///
    /// A `dispute` message freezes the channel in Disputed state.
    pub async fn add_message(&self, message: Message) -> Result<Message> {
        let lock = self.channel_lock(&message.channel_id);
        let _guard = lock.lock().await;

        let mut channel = self.store.get_channel(&message.channel_id).await?;
        if channel.state != ChannelState::Open {
            return Err(ChannelError::State {
                state: channel.state,
                operation: "message",
            });
        }

        let now = Utc::now();
        self.validator.validate_message(&message, &channel, now)?;
        self.store.append_message(&message).await?;

        self.emit(
            message.channel_id,
            "message_added",
            json!({
                "message_id": message.id,
                "message_type": message.kind,
                "from": message.from,
                "to": message.to,
            }),
        )
        .await;

        if message.kind == MessageKind::Dispute {
            channel.state = ChannelState::Disputed;
            channel.updated_at = now;
            self.store.save_channel(&channel).await?;
            self.emit(
                channel.id,
                "channel_disputed",
                json!({ "raised_by": message.from }),
            )
            .await;
        }

        if let Some(sink) = &self.sink {
            sink.channel_message(&message);
        }

        Ok(message)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Get a channel snapshot.
    pub async fn get_channel(&self, id: &ChannelId) -> Result<Channel> {
        Ok(self.store.get_channel(id).await?)
    }

    /// Get a channel together with its recent messages.
    pub async fn get_channel_info(&self, id: &ChannelId) -> Result<ChannelInfoResponse> {
        let channel = self.store.get_channel(id).await?;
        let messages = self.store.get_messages(id).await?;
        Ok(ChannelInfoResponse { channel, messages })
    }

    /// The full message log of a channel.
    pub async fn get_channel_messages(&self, id: &ChannelId) -> Result<Vec<Message>> {
        // surface NotFound rather than an empty log
        self.store.get_channel(id).await?;
        Ok(self.store.get_messages(id).await?)
    }

    /// The full event log of a channel.
    pub async fn get_channel_events(&self, id: &ChannelId) -> Result<Vec<ChannelEvent>> {
        self.store.get_channel(id).await?;
        Ok(self.store.get_events(id).await?)
    }

    /// List channels matching a filter.
    pub async fn list_channels(&self, filter: ChannelFilter) -> Result<ChannelListResponse> {
        let (channels, total) = self.store.list_channels(&filter).await?;
        Ok(ChannelListResponse {
            channels,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    /// Aggregate statistics.
    pub async fn statistics(&self) -> Result<ChannelStatistics> {
        Ok(self.store.statistics().await?)
    }

    /// Check whether an address may perform an operation on a channel.
    pub async fn check_access(
        &self,
        address: &Address,
        id: &ChannelId,
        access: Access,
    ) -> Result<()> {
        let channel = self.store.get_channel(id).await?;
        self.validator.validate_access(address, &channel, access)?;
        Ok(())
    }

    /// Flag senders exceeding the burst threshold within the configured
    /// window.
    pub async fn detect_burst(&self, id: &ChannelId) -> Result<Vec<Address>> {
        let messages = self.store.get_messages(id).await?;
        let window = Duration::from_std(self.config.burst_window)
            .map_err(|e| ChannelError::Internal(e.to_string()))?;
        Ok(self.validator.detect_burst(&messages, window, Utc::now()))
    }

    /// Snapshot a channel for recovery.
    pub async fn backup_channel(&self, id: &ChannelId) -> Result<parley_core::ChannelBackup> {
        Ok(self.store.create_backup(id).await?)
    }

    /// Restore a channel from its latest backup.
    pub async fn restore_channel(&self, id: &ChannelId) -> Result<()> {
        let lock = self.channel_lock(id);
        let _guard = lock.lock().await;
        Ok(self.store.restore_backup(id).await?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expiry
    // ─────────────────────────────────────────────────────────────────────

    /// Expire every overdue channel, skipping any whose lock is
    /// currently contended (they are retried next tick). Returns how
    /// many channels were transitioned.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let overdue = self.store.expired_channels(now).await?;

        let mut count = 0;
        for id in overdue {
            let lock = self.channel_lock(&id);
            let Ok(_guard) = lock.try_lock() else {
                tracing::debug!(channel = %id, "cleanup skipped a busy channel");
                continue;
            };

            match self.store.expire_channel(&id, now).await {
                Ok(Some(event)) => {
                    count += 1;
                    if let Some(sink) = &self.sink {
                        sink.channel_event(&event);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(channel = %id, error = %e, "failed to expire channel");
                }
            }
        }

        Ok(count)
    }

    /// Spawn the background expiry sweep. Errors are logged and retried
    /// on the next tick.
    pub fn spawn_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match manager.cleanup_expired().await {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(count, "expired overdue channels"),
                    Err(e) => tracing::warn!(error = %e, "cleanup sweep failed"),
                }
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Look up (or create) the mutation lock for a channel.
    fn channel_lock(&self, id: &ChannelId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock table poisoned");
        Arc::clone(locks.entry(*id).or_default())
    }

    /// Append an event to the store log and forward it to the sink.
    /// Best-effort: the mutation has already committed.
    async fn emit(&self, channel_id: ChannelId, kind: &str, data: Value) {
        let event = ChannelEvent::new(channel_id, kind, data, Utc::now());
        if let Err(e) = self.store.append_event(&event).await {
            tracing::warn!(channel = %channel_id, error = %e, "failed to log event");
        }
        if let Some(sink) = &self.sink {
            sink.channel_event(&event);
        }
    }
}

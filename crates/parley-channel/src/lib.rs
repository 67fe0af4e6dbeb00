//! # Parley Channel
//!
//! The channel lifecycle state machine. [`ChannelManager`] owns one
//! logical mutex per channel, drives every transition
//! (Opening → Open → Closing/Closed/Disputed), appends messages and
//! events, runs TTL-based expiry and publishes committed traffic
//! through an [`EventSink`].
//!
//! ## Ordering guarantees
//!
//! For a given channel id, all mutations are totally ordered by the
//! per-channel mutex, and events are emitted after the store commit in
//! that same order. Across channels, nothing is promised.

pub mod config;
pub mod error;
pub mod manager;
pub mod sink;

pub use config::ChannelConfig;
pub use error::{ChannelError, Result};
pub use manager::ChannelManager;
pub use sink::{EventSink, NullSink};

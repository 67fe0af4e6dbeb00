//! # Parley Hub
//!
//! Session-oriented realtime fan-out for channel traffic.
//!
//! ## Key Properties
//!
//! - **Non-blocking publish**: a slow consumer never stalls a fast one;
//!   a session whose bounded queue fills up is disconnected.
//! - **Per-session ordering**: each subscriber sees frames in hub
//!   ingestion order. Nothing is promised across sessions.
//! - **Liveness**: heartbeat pings every `ping_period`; a session silent
//!   past `pong_wait` is torn down. Inbound traffic refreshes liveness.
//!
//! The hub implements [`parley_channel::EventSink`], so it plugs
//! directly into the channel manager:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley_channel::{ChannelConfig, ChannelManager};
//! use parley_hub::{Hub, HubConfig};
//! use parley_store::MemoryStore;
//!
//! # fn main() {
//! let hub = Arc::new(Hub::new(HubConfig::default()));
//! let manager = ChannelManager::new(MemoryStore::new(), ChannelConfig::default())
//!     .with_sink(hub.clone());
//! # let _ = manager;
//! # }
//! ```

pub mod error;
pub mod frames;
pub mod hub;
pub mod session;

pub use error::{HubError, Result};
pub use frames::{Frame, FrameKind, InboundMessage};
pub use hub::{Hub, HubConfig};
pub use session::SessionId;

//! Configuration for the channel manager.

use std::time::Duration;

/// Tunable limits for the coordinator.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Hard cap on live channels.
    pub max_channels: usize,

    /// Fallback TTL when a creation request carries none.
    pub default_expiry_hours: f64,

    /// Per-channel serialized data payload limit.
    pub max_data_bytes: usize,

    /// How often the background sweep expires overdue channels.
    pub cleanup_interval: Duration,

    /// Messages per sender per burst window before a sender is flagged.
    pub burst_threshold: usize,

    /// The burst-detection window.
    pub burst_window: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_channels: 1000,
            default_expiry_hours: 24.0,
            max_data_bytes: 1_048_576,
            cleanup_interval: Duration::from_secs(3600),
            burst_threshold: 100,
            burst_window: Duration::from_secs(60),
        }
    }
}

//! Canonical byte serialization for signing payloads.
//!
//! Every signed operation hashes a deterministic byte string with
//! keccak256 before recovery. Fields are joined with a single 0x1f unit
//! separator so cross-language verifiers agree byte-for-byte. Addresses
//! appear in their `0x`-prefixed lowercase hex form; integers are
//! big-endian.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::types::{ChannelId, Message};

/// The field separator in canonical payloads.
pub const UNIT_SEPARATOR: u8 = 0x1f;

/// Deepest nesting admitted in a channel data payload. `serde_json`
/// values are trees, so a depth bound is the whole cycle story.
pub const MAX_DATA_DEPTH: usize = 64;

/// Canonical bytes for accepting a channel: `"accept:" || channel_id`.
pub fn accept_bytes(channel_id: &ChannelId) -> Vec<u8> {
    let mut buf = Vec::with_capacity(7 + 32);
    buf.extend_from_slice(b"accept:");
    buf.extend_from_slice(channel_id.to_hex().as_bytes());
    buf
}

/// Canonical bytes for a state update:
/// `channel_id || 0x1f || nonce_u64_be || 0x1f || unix_s_i64_be`.
pub fn state_update_bytes(
    channel_id: &ChannelId,
    nonce: u64,
    timestamp: DateTime<Utc>,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + 1 + 8 + 1 + 8);
    buf.extend_from_slice(channel_id.to_hex().as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(&nonce.to_be_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(&timestamp.timestamp().to_be_bytes());
    buf
}

/// Canonical bytes for closing a channel:
/// `"close:" || channel_id || 0x1f || unix_s_i64_be`.
pub fn close_bytes(channel_id: &ChannelId, timestamp: DateTime<Utc>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(6 + 32 + 1 + 8);
    buf.extend_from_slice(b"close:");
    buf.extend_from_slice(channel_id.to_hex().as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(&timestamp.timestamp().to_be_bytes());
    buf
}

/// Canonical bytes for a channel message:
/// `id || 0x1f || channel_id || 0x1f || from || 0x1f || to || 0x1f ||
///  nonce_u64_be || 0x1f || type_tag`.
pub fn message_bytes(message: &Message) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(message.id.as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(message.channel_id.to_hex().as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(message.from.to_hex().as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(message.to.to_hex().as_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(&message.nonce.to_be_bytes());
    buf.push(UNIT_SEPARATOR);
    buf.extend_from_slice(message.kind.as_str().as_bytes());
    buf
}

/// Serialized size of a data payload, as it would go over the wire.
pub fn data_size(data: &Map<String, Value>) -> usize {
    serde_json::to_vec(data).map(|v| v.len()).unwrap_or(0)
}

/// Check a data payload against the size and nesting bounds.
pub fn check_data_bounds(
    data: &Map<String, Value>,
    max_bytes: usize,
) -> Result<(), ValidationError> {
    let size = data_size(data);
    if size > max_bytes {
        return Err(ValidationError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    for value in data.values() {
        if value_depth(value) > MAX_DATA_DEPTH {
            return Err(ValidationError::PayloadTooDeep(MAX_DATA_DEPTH));
        }
    }
    Ok(())
}

/// Depth of a JSON value tree; scalars count as 1.
fn value_depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(value_depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(value_depth).max().unwrap_or(0),
        _ => 1,
    }
}

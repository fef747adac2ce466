// Realtime wire message and connection status models
// Author: kelexine (https://github.com/kelexine)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type used by the keepalive ping.
pub const PING_TYPE: &str = "ping";

/// JSON envelope exchanged with the gateway: `{type, event, data, timestamp}`.
///
/// All four fields are required on the way in; payloads of any other
/// shape are dropped by the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub data: Value,
    /// ISO-8601 / RFC 3339 timestamp.
    pub timestamp: String,
}

impl ChannelMessage {
    pub fn new(kind: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            event: event.into(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Keepalive sent on the heartbeat interval.
    pub fn ping() -> Self {
        Self::new(PING_TYPE, PING_TYPE, Value::Null)
    }
}

/// Observable state of a realtime channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnecting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn open() -> Self {
        Self {
            connected: true,
            reconnecting: false,
            error: None,
        }
    }

    pub fn closed() -> Self {
        Self::default()
    }

    pub fn reconnecting() -> Self {
        Self {
            connected: false,
            reconnecting: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            reconnecting: false,
            error: Some(error.into()),
        }
    }
}

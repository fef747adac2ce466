//! Realtime gateway channel.
//!
//! # Components
//!
//! - `channel`: the reconnecting WebSocket client and its background tasks.
//! - `endpoint`: resolves the `ws(s)://` URL from configuration.
//! - `message`: the JSON envelope and the connection status model.
//! - `reconnect`: fixed-delay, bounded reconnection policy.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod channel;
mod endpoint;
mod message;
mod reconnect;

pub use channel::{MessageStream, Phase, RealtimeChannel, StatusStream, NORMAL_CLOSURE};
pub use endpoint::resolve_endpoint;
pub use message::{ChannelMessage, ConnectionStatus, PING_TYPE};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};

/// Source of the bearer credential appended to the endpoint URL.
///
/// Consulted on every connection attempt, including automatic retries,
/// so a refreshed token is picked up without rebuilding the channel.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

/// Fixed credential, for tools and tests.
#[derive(Clone)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

// Custom Debug impl that never prints the token
impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = self.0.as_ref().map(|_| "[REDACTED]");
        f.debug_tuple("StaticCredential").field(&shown).finish()
    }
}

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

//! Notification channel port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PortError;

/// Identifier of a notification channel (topic, webhook, queue name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap a channel identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is blank.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message ready for publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Destination channel.
    pub target: ChannelId,
    /// Short subject line.
    pub subject: String,
    /// Structured body.
    pub payload: serde_json::Value,
}

/// Fire-and-forget alerting channel.
///
/// Callers treat publication as best effort: an error is logged and never
/// replaces the outcome of the operation being reported.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish one message.
    async fn publish(&self, notification: &Notification) -> Result<(), PortError>;
}

//! Secret store port.

use async_trait::async_trait;

use crate::error::PortError;
use crate::model::SecretEntry;

/// Durable store for the current credential material of each identity.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Write `entry` under its name, creating the secret if it is absent and
    /// overwriting it otherwise. Writes are all-or-nothing.
    async fn upsert(&self, entry: &SecretEntry) -> Result<(), PortError>;
}

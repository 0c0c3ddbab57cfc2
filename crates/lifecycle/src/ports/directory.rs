//! Identity directory port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PortError;
use crate::model::{AccessKey, IdentityName, IssuedKey, KeyId};

/// Enumerates identities and mutates their access keys.
///
/// The directory enforces a ceiling of two keys per identity: `create_key`
/// on an identity that already holds two keys fails with
/// [`PortError::Rejected`]. Status only moves from active to inactive,
/// through [`deactivate_key`](Self::deactivate_key).
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    /// All identities known to the directory.
    async fn list_identities(&self) -> Result<Vec<IdentityName>, PortError>;

    /// Current keys of `identity`, with status, creation and last-use times.
    async fn list_keys(&self, identity: &IdentityName) -> Result<Vec<AccessKey>, PortError>;

    /// Mark a key inactive. [`PortError::NotFound`] if the key is gone.
    async fn deactivate_key(&self, identity: &IdentityName, key: &KeyId) -> Result<(), PortError>;

    /// Remove a key permanently. [`PortError::NotFound`] if the key is gone.
    async fn delete_key(&self, identity: &IdentityName, key: &KeyId) -> Result<(), PortError>;

    /// Issue a new active key and return its secret material.
    async fn create_key(&self, identity: &IdentityName) -> Result<IssuedKey, PortError>;

    /// Last authenticated use of a key; `None` if it was never used.
    async fn get_last_used(
        &self,
        identity: &IdentityName,
        key: &KeyId,
    ) -> Result<Option<DateTime<Utc>>, PortError>;
}

//! Error types for the key lifecycle.
//!
//! Collaborators report failures as [`PortError`]; the orchestrators lift
//! them into [`LifecycleError`], which carries the identity and the step
//! that failed so a pass report can be read without the logs.

use thiserror::Error;

use crate::model::{IdentityName, KeyId};

/// Error returned by every collaborator port.
///
/// Drivers map their transport errors into these variants so the
/// orchestrators can tell a vanished key apart from an unreachable service
/// without inspecting messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    /// The addressed entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity (e.g. "identity", "key").
        entity: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// The backing service could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request (quota, ceiling, permissions).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Catch-all internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PortError {
    /// Convenience constructor for [`PortError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns `true` if the addressed entity does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Directory mutation or query that failed for a single identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryOperation {
    /// `list_keys`
    ListKeys,
    /// `deactivate_key`
    Deactivate,
    /// `delete_key`
    Delete,
    /// `create_key`
    Create,
    /// `get_last_used`
    LastUsed,
}

impl std::fmt::Display for DirectoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ListKeys => "list keys",
            Self::Deactivate => "deactivate key",
            Self::Delete => "delete key",
            Self::Create => "create key",
            Self::LastUsed => "read last use",
        };
        f.write_str(name)
    }
}

/// Errors raised while planning or applying a lifecycle pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Identities could not be enumerated. Aborts the whole pass.
    #[error("directory unavailable: {source}")]
    DirectoryUnavailable {
        /// Underlying port failure.
        source: PortError,
    },

    /// A directory call for one identity failed.
    #[error("failed to {operation} for {identity}: {source}")]
    Directory {
        /// Identity being processed.
        identity: IdentityName,
        /// Step that failed.
        operation: DirectoryOperation,
        /// Underlying port failure.
        source: PortError,
    },

    /// New credential material could not be written to the secret store.
    #[error("secret store rejected credentials for {identity}: {source}")]
    SecretStoreFailure {
        /// Identity being rotated.
        identity: IdentityName,
        /// Underlying port failure.
        source: PortError,
    },

    /// The rotation record could not be appended to the audit ledger.
    #[error("audit ledger rejected rotation record for {identity}: {source}")]
    AuditFailure {
        /// Identity being rotated.
        identity: IdentityName,
        /// Underlying port failure.
        source: PortError,
    },

    /// No inactive key can be removed, so creating a key would break the
    /// two-key ceiling.
    #[error("no free key slot for {identity}: {key_count} keys on record")]
    SlotUnavailable {
        /// Identity being rotated.
        identity: IdentityName,
        /// Keys observed on the identity.
        key_count: usize,
    },

    /// A stale inactive key could not be deleted. Aborts the retirement pass.
    #[error("failed to delete key {key_id} of {identity}: {source}")]
    DeletionFailure {
        /// Owner of the key.
        identity: IdentityName,
        /// Key that survived.
        key_id: KeyId,
        /// Underlying port failure.
        source: PortError,
    },
}

impl LifecycleError {
    /// Stable, machine-readable error kind used in notification payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DirectoryUnavailable { .. } => "directory_unavailable",
            Self::Directory { .. } => "directory_failure",
            Self::SecretStoreFailure { .. } => "secret_store_failure",
            Self::AuditFailure { .. } => "audit_failure",
            Self::SlotUnavailable { .. } => "slot_unavailable",
            Self::DeletionFailure { .. } => "deletion_failure",
        }
    }

    /// Identity the error is scoped to, if any.
    pub fn identity(&self) -> Option<&IdentityName> {
        match self {
            Self::DirectoryUnavailable { .. } => None,
            Self::Directory { identity, .. }
            | Self::SecretStoreFailure { identity, .. }
            | Self::AuditFailure { identity, .. }
            | Self::SlotUnavailable { identity, .. }
            | Self::DeletionFailure { identity, .. } => Some(identity),
        }
    }
}

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

//! Audit ledger port.

use async_trait::async_trait;

use crate::error::PortError;
use crate::model::RotationRecord;

/// Append-only rotation history.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Append one record. Records are never updated or removed.
    async fn append(&self, record: &RotationRecord) -> Result<(), PortError>;
}

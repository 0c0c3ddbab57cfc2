//! Keyward Lifecycle - access key rotation and retirement
//!
//! Decides, per identity, what to do with its access keys and applies the
//! decision against a directory that allows at most two keys per identity.
//!
//! # Passes
//!
//! - **Rotation** - deactivate the current key, free a slot if needed, issue
//!   a new key, persist it to the secret store and record the rotation.
//!   Failures are isolated per identity.
//! - **Retirement** - delete inactive keys unused for longer than the
//!   configured threshold. Any failure aborts the pass.
//!
//! # Layout
//!
//! - [`policy`] - pure decisions ([`plan_rotation`], [`RetirementPolicy`])
//! - [`orchestrator`] - applies decisions through the [`ports`]
//! - [`memory`] - in-memory collaborators for tests and local runs
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use chrono::{TimeZone, Utc};
//! use keyward_lifecycle::memory::{
//!     InMemoryAuditLedger, InMemoryDirectory, InMemorySecretStore, RecordingNotifier,
//! };
//! use keyward_lifecycle::prelude::*;
//!
//! # tokio_test_block(async {
//! let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let directory = Arc::new(
//!     InMemoryDirectory::new().with_identity("alice", vec![AccessKey::active("A1", t0)]),
//! );
//! let collaborators = Collaborators {
//!     directory: directory.clone(),
//!     secrets: Arc::new(InMemorySecretStore::new()),
//!     audit: Arc::new(InMemoryAuditLedger::new()),
//!     notifier: Arc::new(RecordingNotifier::new()),
//! };
//! let config = LifecycleConfig::new(
//!     NotificationTarget::new("rotation"),
//!     NotificationTarget::new("retirement"),
//! );
//!
//! let lifecycle = KeyLifecycle::new(collaborators, &config);
//! let report = lifecycle
//!     .run_rotation_pass(&TriggerContext::new(serde_json::json!({})))
//!     .await
//!     .unwrap();
//!
//! assert_eq!(report.status, PassStatus::Completed);
//! assert_eq!(directory.keys("alice").await.len(), 2);
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```
#![forbid(unsafe_code)]

/// Lifecycle configuration
pub mod config;
/// Error types
pub mod error;
/// Notification events
pub mod events;
/// In-memory collaborators
pub mod memory;
/// Domain model
pub mod model;
/// Pass orchestration
pub mod orchestrator;
/// Pure lifecycle decisions
pub mod policy;
/// Collaborator ports
pub mod ports;
/// Pass reports
pub mod report;

// ── Root re-exports ─────────────────────────────────────────────────────────

pub use crate::config::{ConfigError, LifecycleConfig, NotificationTarget};
pub use crate::error::{DirectoryOperation, LifecycleError, LifecycleResult, PortError};
pub use crate::events::LifecycleEvent;
pub use crate::model::{
    AccessKey, IdentityName, IssuedKey, KeyId, KeyStatus, RotationRecord, SecretEntry,
    TriggerContext,
};
pub use crate::orchestrator::{
    Collaborators, KeyLifecycle, RetirementOrchestrator, RotationOrchestrator,
};
pub use crate::policy::{Action, ActionPlan, RetirementPolicy, plan_rotation};
pub use crate::report::{IdentityOutcome, PassStatus, RetiredKey, RetirementReport, RotationReport};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::config::{LifecycleConfig, NotificationTarget};
    pub use crate::error::{LifecycleError, LifecycleResult, PortError};
    pub use crate::model::{
        AccessKey, IdentityName, IssuedKey, KeyId, KeyStatus, RotationRecord, SecretEntry,
        TriggerContext,
    };
    pub use crate::orchestrator::{Collaborators, KeyLifecycle};
    pub use crate::ports::{AuditLedger, DirectoryGateway, Notification, Notifier, SecretStore};
    pub use crate::report::{IdentityOutcome, PassStatus, RetirementReport, RotationReport};
}

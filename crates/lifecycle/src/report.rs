//! Pass-level results handed back to the invoker.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::LifecycleError;
use crate::model::{IdentityName, KeyId, RotationRecord};

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    /// Every identity was processed.
    Completed,
    /// Every identity was processed, some of them failed.
    CompletedWithFailures,
    /// The trigger was cancelled; remaining identities were skipped.
    Cancelled,
}

fn serialize_error<S: Serializer>(error: &LifecycleError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Outcome of rotating a single identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IdentityOutcome {
    /// The identity holds a new active key.
    Rotated(RotationRecord),
    /// The plan was aborted at the failing step.
    Failed {
        /// Identity that failed.
        identity: IdentityName,
        /// Why it failed.
        #[serde(serialize_with = "serialize_error")]
        error: LifecycleError,
    },
}

impl IdentityOutcome {
    /// Identity this outcome belongs to.
    pub fn identity(&self) -> &IdentityName {
        match self {
            Self::Rotated(record) => &record.identity,
            Self::Failed { identity, .. } => identity,
        }
    }

    /// Returns `true` for [`IdentityOutcome::Rotated`].
    pub fn is_rotated(&self) -> bool {
        matches!(self, Self::Rotated(_))
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&LifecycleError> {
        match self {
            Self::Rotated(_) => None,
            Self::Failed { error, .. } => Some(error),
        }
    }
}

/// Result of a rotation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// How the pass ended.
    pub status: PassStatus,
    /// One entry per processed identity, in processing order.
    pub outcomes: Vec<IdentityOutcome>,
}

impl RotationReport {
    /// Outcome for `identity`, if it was processed.
    pub fn outcome(&self, identity: &str) -> Option<&IdentityOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.identity().as_str() == identity)
    }

    /// Identities that now hold a new key.
    pub fn rotated(&self) -> impl Iterator<Item = &IdentityName> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_rotated())
            .map(IdentityOutcome::identity)
    }

    /// Identities whose plan failed.
    pub fn failed(&self) -> impl Iterator<Item = &IdentityName> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.is_rotated())
            .map(IdentityOutcome::identity)
    }
}

/// A key removed by the retirement pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetiredKey {
    /// Owner of the key.
    pub identity: IdentityName,
    /// Deleted key.
    pub key_id: KeyId,
    /// Last use before deletion; `None` if never used.
    pub last_used: Option<DateTime<Utc>>,
}

/// Result of a retirement pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetirementReport {
    /// How the pass ended. Never `CompletedWithFailures`: any failure is fatal.
    pub status: PassStatus,
    /// Every key deleted, across all identities.
    pub deleted: Vec<RetiredKey>,
}

//! Retirement eligibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AccessKey;

/// Staleness threshold applied when none is configured.
pub const DEFAULT_THRESHOLD_DAYS: u32 = 30;

/// Decides which inactive keys are stale enough to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetirementPolicy {
    threshold_days: u32,
}

impl Default for RetirementPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_DAYS)
    }
}

impl RetirementPolicy {
    /// Policy retiring keys unused for more than `threshold_days` whole days.
    pub fn new(threshold_days: u32) -> Self {
        Self { threshold_days }
    }

    /// Configured threshold in days.
    pub fn threshold_days(&self) -> u32 {
        self.threshold_days
    }

    /// Only inactive keys are ever considered.
    pub fn applies_to(&self, key: &AccessKey) -> bool {
        !key.status.is_active()
    }

    /// A key never used is always eligible. Otherwise the whole days elapsed
    /// since its last use must strictly exceed the threshold.
    pub fn is_eligible(&self, last_used: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match last_used {
            None => true,
            Some(at) => (now - at).num_days() > i64::from(self.threshold_days),
        }
    }
}

//! Configuration for lifecycle passes.

use serde::{Deserialize, Serialize};

use crate::policy::{DEFAULT_THRESHOLD_DAYS, RetirementPolicy};
use crate::ports::ChannelId;

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Where a pass publishes its notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTarget {
    /// Channel identifier (topic ARN, webhook name, queue).
    pub target: ChannelId,
}

impl NotificationTarget {
    /// Target a channel.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: ChannelId::new(target),
        }
    }
}

/// Externally supplied settings for both passes.
///
/// # Example
///
/// ```
/// use keyward_lifecycle::LifecycleConfig;
///
/// let config: LifecycleConfig = serde_json::from_value(serde_json::json!({
///     "rotation": { "target": "iam-key-rotation-notify" },
///     "retirement": { "target": "iam-key-deletion-notify" },
/// }))
/// .unwrap();
///
/// assert_eq!(config.threshold_days, 30);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Channel for rotation notifications.
    pub rotation: NotificationTarget,

    /// Channel for retirement notifications.
    pub retirement: NotificationTarget,

    /// Inactive keys unused for more than this many days are deleted.
    #[serde(default = "default_threshold_days")]
    pub threshold_days: u32,
}

fn default_threshold_days() -> u32 {
    DEFAULT_THRESHOLD_DAYS
}

impl LifecycleConfig {
    /// Configuration with the default staleness threshold.
    pub fn new(rotation: NotificationTarget, retirement: NotificationTarget) -> Self {
        Self {
            rotation,
            retirement,
            threshold_days: DEFAULT_THRESHOLD_DAYS,
        }
    }

    /// Override the staleness threshold.
    pub fn with_threshold_days(mut self, threshold_days: u32) -> Self {
        self.threshold_days = threshold_days;
        self
    }

    /// Retirement policy derived from the threshold.
    pub fn retirement_policy(&self) -> RetirementPolicy {
        RetirementPolicy::new(self.threshold_days)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, target) in [
            ("rotation.target", &self.rotation.target),
            ("retirement.target", &self.retirement.target),
        ] {
            if target.is_blank() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    reason: "channel identifier must not be empty".into(),
                });
            }
        }
        Ok(())
    }
}

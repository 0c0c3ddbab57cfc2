//! Lifecycle Notification Events
//!
//! Every notification a pass publishes starts life as a [`LifecycleEvent`].
//! The event decides its own subject line and JSON body; the orchestrators
//! only pick the channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::LifecycleError;
use crate::model::{IdentityName, KeyId, RotationRecord};
use crate::ports::{ChannelId, Notification};
use crate::report::RetiredKey;

/// Marker published instead of an empty deletion list.
pub const NO_INACTIVE_KEYS: &str = "No inactive keys found.";

/// Notification event for the key lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// One identity was rotated.
    KeyRotated {
        /// Rotated identity.
        identity: IdentityName,
        /// Deactivated key, if the identity had one.
        old_key: Option<KeyId>,
        /// Newly issued key.
        new_key: KeyId,
        /// When the key was issued.
        timestamp: DateTime<Utc>,
    },

    /// One identity's plan was aborted.
    RotationFailed {
        /// Identity that failed.
        identity: IdentityName,
        /// Machine-readable error kind.
        kind: &'static str,
        /// Error message.
        error: String,
        /// When the failure was observed.
        timestamp: DateTime<Utc>,
    },

    /// A rotation pass processed every identity it reached.
    RotationPassSummary {
        /// Identities that hold a new key.
        rotated: Vec<IdentityName>,
        /// Identities whose plan failed.
        failed: Vec<IdentityName>,
        /// Whether the pass stopped early on cancellation.
        cancelled: bool,
        /// When the pass finished.
        timestamp: DateTime<Utc>,
    },

    /// The rotation pass itself could not run.
    RotationPassFailed {
        /// Error message.
        error: String,
        /// Trigger payload that started the pass.
        event: Value,
    },

    /// A retirement pass finished.
    InactiveKeysDeleted {
        /// Keys removed, across all identities.
        deleted_keys: Vec<RetiredKey>,
        /// When the pass finished.
        timestamp: DateTime<Utc>,
    },

    /// The retirement pass aborted.
    RetirementFailed {
        /// Error message.
        error: String,
        /// Trigger payload that started the pass.
        event: Value,
    },
}

impl LifecycleEvent {
    /// Event for a committed rotation.
    pub fn rotated(record: &RotationRecord) -> Self {
        Self::KeyRotated {
            identity: record.identity.clone(),
            old_key: record.old_key_id.clone(),
            new_key: record.new_key_id.clone(),
            timestamp: record.rotated_at,
        }
    }

    /// Event for an aborted identity plan.
    pub fn rotation_failed(
        identity: &IdentityName,
        error: &LifecycleError,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::RotationFailed {
            identity: identity.clone(),
            kind: error.kind(),
            error: error.to_string(),
            timestamp,
        }
    }

    /// Returns `true` for events that report a failure.
    pub fn is_failure(&self) -> bool {
        match self {
            Self::RotationFailed { .. }
            | Self::RotationPassFailed { .. }
            | Self::RetirementFailed { .. } => true,
            Self::RotationPassSummary { failed, .. } => !failed.is_empty(),
            Self::KeyRotated { .. } | Self::InactiveKeysDeleted { .. } => false,
        }
    }

    /// Subject line.
    pub fn subject(&self) -> String {
        match self {
            Self::KeyRotated { identity, .. } => format!("IAM key rotated for {identity}"),
            Self::RotationFailed { identity, .. } => format!("IAM key rotation failed for {identity}"),
            Self::RotationPassSummary { failed, .. } if failed.is_empty() => {
                "Key rotation completed".to_string()
            }
            Self::RotationPassSummary { failed, .. } => {
                format!("Key rotation completed with {} failure(s)", failed.len())
            }
            Self::RotationPassFailed { .. } => "Key rotation failed".to_string(),
            Self::InactiveKeysDeleted { .. } => "IAM inactive keys deleted".to_string(),
            Self::RetirementFailed { .. } => "Inactive key deletion failed".to_string(),
        }
    }

    /// Structured body.
    pub fn payload(&self) -> Value {
        match self {
            Self::KeyRotated {
                identity,
                old_key,
                new_key,
                timestamp,
            } => json!({
                "user": identity,
                "oldKey": old_key,
                "newKey": new_key,
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::RotationFailed {
                identity,
                kind,
                error,
                timestamp,
            } => json!({
                "user": identity,
                "kind": kind,
                "error": error,
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::RotationPassSummary {
                rotated,
                failed,
                cancelled,
                timestamp,
            } => json!({
                "rotated": rotated,
                "failed": failed,
                "cancelled": cancelled,
                "timestamp": timestamp.to_rfc3339(),
            }),
            Self::RotationPassFailed { error, event } | Self::RetirementFailed { error, event } => {
                json!({ "error": error, "event": event })
            }
            Self::InactiveKeysDeleted {
                deleted_keys,
                timestamp,
            } => {
                let deleted: Value = if deleted_keys.is_empty() {
                    Value::from(NO_INACTIVE_KEYS)
                } else {
                    deleted_keys
                        .iter()
                        .map(|key| {
                            json!({
                                "user": key.identity,
                                "keyId": key.key_id,
                                "lastUsed": key.last_used.map(|at| at.to_rfc3339()),
                            })
                        })
                        .collect()
                };
                json!({ "timestamp": timestamp.to_rfc3339(), "deletedKeys": deleted })
            }
        }
    }

    /// Address the event to a channel.
    pub fn to_notification(&self, target: &ChannelId) -> Notification {
        Notification {
            target: target.clone(),
            subject: self.subject(),
            payload: self.payload(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn rotated_payload_names_both_keys() {
        let record = RotationRecord {
            identity: IdentityName::from("alice"),
            rotated_at: at(),
            old_key_id: Some(KeyId::from("A1")),
            new_key_id: KeyId::from("A2"),
        };
        let event = LifecycleEvent::rotated(&record);

        assert_eq!(event.subject(), "IAM key rotated for alice");
        assert_eq!(
            event.payload(),
            json!({
                "user": "alice",
                "oldKey": "A1",
                "newKey": "A2",
                "timestamp": "2024-03-01T00:00:00+00:00",
            })
        );
        assert!(!event.is_failure());
    }

    #[test]
    fn first_rotation_has_null_old_key() {
        let record = RotationRecord {
            identity: IdentityName::from("new-hire"),
            rotated_at: at(),
            old_key_id: None,
            new_key_id: KeyId::from("N1"),
        };
        assert_eq!(LifecycleEvent::rotated(&record).payload()["oldKey"], Value::Null);
    }

    #[test]
    fn empty_deletion_uses_marker() {
        let event = LifecycleEvent::InactiveKeysDeleted {
            deleted_keys: Vec::new(),
            timestamp: at(),
        };
        assert_eq!(event.payload()["deletedKeys"], json!(NO_INACTIVE_KEYS));
    }

    #[test]
    fn deletion_list_is_rendered() {
        let event = LifecycleEvent::InactiveKeysDeleted {
            deleted_keys: vec![RetiredKey {
                identity: IdentityName::from("carol"),
                key_id: KeyId::from("K"),
                last_used: None,
            }],
            timestamp: at(),
        };
        assert_eq!(
            event.payload()["deletedKeys"],
            json!([{ "user": "carol", "keyId": "K", "lastUsed": null }])
        );
    }

    #[test]
    fn pass_failure_echoes_trigger() {
        let event = LifecycleEvent::RetirementFailed {
            error: "boom".into(),
            event: json!({ "source": "cron" }),
        };
        let note = event.to_notification(&ChannelId::new("ops"));

        assert_eq!(note.subject, "Inactive key deletion failed");
        assert_eq!(note.payload, json!({ "error": "boom", "event": { "source": "cron" } }));
        assert!(event.is_failure());
    }

    #[test]
    fn summary_subject_counts_failures() {
        let event = LifecycleEvent::RotationPassSummary {
            rotated: vec![IdentityName::from("eve")],
            failed: vec![IdentityName::from("dave")],
            cancelled: false,
            timestamp: at(),
        };
        assert_eq!(event.subject(), "Key rotation completed with 1 failure(s)");
        assert!(event.is_failure());
    }
}

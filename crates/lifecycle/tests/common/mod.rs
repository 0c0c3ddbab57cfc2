//! Shared fixtures for the pass-level tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use keyward_lifecycle::memory::{
    InMemoryAuditLedger, InMemoryDirectory, InMemorySecretStore, RecordingNotifier,
};
use keyward_lifecycle::prelude::*;

pub const ROTATION_TOPIC: &str = "iam-key-rotation-notify";
pub const DELETION_TOPIC: &str = "iam-key-deletion-notify";

/// Midnight UTC, `n` days after the fixture epoch.
pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn trigger(at: DateTime<Utc>) -> TriggerContext {
    TriggerContext::new(serde_json::json!({ "source": "test", "detail-type": "Scheduled Event" }))
        .at(at)
}

pub fn config() -> LifecycleConfig {
    LifecycleConfig::new(
        NotificationTarget::new(ROTATION_TOPIC),
        NotificationTarget::new(DELETION_TOPIC),
    )
}

/// In-memory collaborators wired into a [`KeyLifecycle`].
pub struct Harness {
    pub directory: Arc<InMemoryDirectory>,
    pub secrets: Arc<InMemorySecretStore>,
    pub audit: Arc<InMemoryAuditLedger>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(directory: InMemoryDirectory) -> Self {
        Self {
            directory: Arc::new(directory),
            secrets: Arc::new(InMemorySecretStore::new()),
            audit: Arc::new(InMemoryAuditLedger::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            directory: self.directory.clone(),
            secrets: self.secrets.clone(),
            audit: self.audit.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn lifecycle(&self) -> KeyLifecycle {
        self.lifecycle_with(&config())
    }

    pub fn lifecycle_with(&self, config: &LifecycleConfig) -> KeyLifecycle {
        KeyLifecycle::new(self.collaborators(), config)
    }

    /// Notifications published for `identity` (by `user` field), in order.
    pub fn notifications_for(&self, identity: &str) -> Vec<Notification> {
        self.notifier
            .notifications()
            .into_iter()
            .filter(|n| n.payload["user"] == identity)
            .collect()
    }
}

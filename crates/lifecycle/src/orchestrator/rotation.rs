//! Rotation pass.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Collaborators, is_cancelled, publish};
use crate::config::LifecycleConfig;
use crate::error::{DirectoryOperation, LifecycleError, LifecycleResult, PortError};
use crate::events::LifecycleEvent;
use crate::model::{IdentityName, RotationRecord, SecretEntry, TriggerContext};
use crate::policy::{Action, plan_rotation};
use crate::ports::ChannelId;
use crate::report::{IdentityOutcome, PassStatus, RotationReport};

/// Applies rotation plans identity by identity.
///
/// Each identity is independent: a failing step aborts that identity's plan
/// and the pass moves on. Only a failure to enumerate identities aborts the
/// pass. Every identity gets a success or failure notification, and the pass
/// ends with one summary notification.
#[derive(Debug, Clone)]
pub struct RotationOrchestrator {
    collaborators: Collaborators,
    channel: ChannelId,
    cancel: Option<CancellationToken>,
}

impl RotationOrchestrator {
    /// Orchestrator publishing to the configured rotation channel.
    pub fn new(collaborators: Collaborators, config: &LifecycleConfig) -> Self {
        Self {
            collaborators,
            channel: config.rotation.target.clone(),
            cancel: None,
        }
    }

    /// Skip identities not yet started once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run one rotation pass over every identity.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::DirectoryUnavailable`] if identities cannot be
    /// listed. A failure notification is published before returning.
    pub async fn run(&self, trigger: &TriggerContext) -> LifecycleResult<RotationReport> {
        let notifier = self.collaborators.notifier.as_ref();

        let identities = match self.collaborators.directory.list_identities().await {
            Ok(identities) => identities,
            Err(source) => {
                let err = LifecycleError::DirectoryUnavailable { source };
                error!(error = %err, "Rotation pass aborted");
                let event = LifecycleEvent::RotationPassFailed {
                    error: err.to_string(),
                    event: trigger.event.clone(),
                };
                publish(notifier, &self.channel, &event).await;
                return Err(err);
            }
        };

        info!(identities = identities.len(), "Starting rotation pass");

        let mut status = PassStatus::Completed;
        let mut outcomes = Vec::with_capacity(identities.len());

        for identity in identities {
            if is_cancelled(self.cancel.as_ref()) {
                warn!(processed = outcomes.len(), "Rotation pass cancelled");
                status = PassStatus::Cancelled;
                break;
            }

            let outcome = match self.rotate_identity(&identity, trigger).await {
                Ok(record) => {
                    publish(notifier, &self.channel, &LifecycleEvent::rotated(&record)).await;
                    IdentityOutcome::Rotated(record)
                }
                Err(err) => {
                    warn!(identity = %identity, kind = err.kind(), error = %err, "Rotation failed");
                    let event =
                        LifecycleEvent::rotation_failed(&identity, &err, trigger.reference_time);
                    publish(notifier, &self.channel, &event).await;
                    IdentityOutcome::Failed {
                        identity,
                        error: err,
                    }
                }
            };
            outcomes.push(outcome);
        }

        if status == PassStatus::Completed && outcomes.iter().any(|o| !o.is_rotated()) {
            status = PassStatus::CompletedWithFailures;
        }
        let report = RotationReport { status, outcomes };

        let summary = LifecycleEvent::RotationPassSummary {
            rotated: report.rotated().cloned().collect(),
            failed: report.failed().cloned().collect(),
            cancelled: report.status == PassStatus::Cancelled,
            timestamp: trigger.reference_time,
        };
        publish(notifier, &self.channel, &summary).await;

        info!(
            status = ?report.status,
            rotated = report.rotated().count(),
            failed = report.failed().count(),
            "Rotation pass finished"
        );
        Ok(report)
    }

    #[tracing::instrument(skip(self, trigger), fields(identity = %identity))]
    async fn rotate_identity(
        &self,
        identity: &IdentityName,
        trigger: &TriggerContext,
    ) -> LifecycleResult<RotationRecord> {
        let directory = self.collaborators.directory.as_ref();
        let directory_error =
            |operation: DirectoryOperation, source: PortError| LifecycleError::Directory {
                identity: identity.clone(),
                operation,
                source,
            };

        let keys = directory
            .list_keys(identity)
            .await
            .map_err(|source| directory_error(DirectoryOperation::ListKeys, source))?;

        let plan = plan_rotation(&keys).map_err(|slot| LifecycleError::SlotUnavailable {
            identity: identity.clone(),
            key_count: slot.key_count,
        })?;
        debug!(actions = ?plan.actions(), "Computed rotation plan");

        let old_key_id = plan.deactivation_target().cloned();
        let mut issued = None;

        for action in plan {
            match action {
                Action::Deactivate(key) => {
                    directory
                        .deactivate_key(identity, &key)
                        .await
                        .map_err(|source| directory_error(DirectoryOperation::Deactivate, source))?;
                    info!(key_id = %key, "Deactivated key");
                }
                Action::DeleteOldestInactive(key) => match directory.delete_key(identity, &key).await {
                    Ok(()) => info!(key_id = %key, "Deleted oldest inactive key"),
                    Err(source) if source.is_not_found() => {
                        warn!(key_id = %key, "Inactive key already gone, slot is free");
                    }
                    Err(source) => return Err(directory_error(DirectoryOperation::Delete, source)),
                },
                Action::CreateNew => {
                    let key = directory
                        .create_key(identity)
                        .await
                        .map_err(|source| directory_error(DirectoryOperation::Create, source))?;
                    info!(key_id = %key.id, "Created key");
                    issued = Some(key);
                }
            }
        }

        // Plans always end in CreateNew.
        let Some(issued) = issued else {
            return Err(LifecycleError::SlotUnavailable {
                identity: identity.clone(),
                key_count: keys.len(),
            });
        };

        let new_key_id = issued.id.clone();
        let entry = SecretEntry::for_identity(identity, issued);
        if let Err(source) = self.collaborators.secrets.upsert(&entry).await {
            error!(
                key_id = %new_key_id,
                secret = entry.name(),
                "New key exists in the directory but not in the secret store"
            );
            return Err(LifecycleError::SecretStoreFailure {
                identity: identity.clone(),
                source,
            });
        }
        debug!(secret = entry.name(), "Stored credential material");

        let record = RotationRecord {
            identity: identity.clone(),
            rotated_at: trigger.reference_time,
            old_key_id,
            new_key_id,
        };
        self.collaborators
            .audit
            .append(&record)
            .await
            .map_err(|source| LifecycleError::AuditFailure {
                identity: identity.clone(),
                source,
            })?;

        Ok(record)
    }
}

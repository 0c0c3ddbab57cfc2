//! Retirement pass.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Collaborators, is_cancelled, publish};
use crate::config::LifecycleConfig;
use crate::error::{DirectoryOperation, LifecycleError, LifecycleResult, PortError};
use crate::events::LifecycleEvent;
use crate::model::{IdentityName, TriggerContext};
use crate::policy::RetirementPolicy;
use crate::ports::ChannelId;
use crate::report::{PassStatus, RetiredKey, RetirementReport};

/// Deletes inactive keys that have not been used within the threshold.
///
/// Keys are deleted as soon as they are found eligible. Unlike rotation,
/// any failure aborts the whole pass: the failure notification carries the
/// error and the trigger payload, and no partial list is published.
#[derive(Debug, Clone)]
pub struct RetirementOrchestrator {
    collaborators: Collaborators,
    channel: ChannelId,
    policy: RetirementPolicy,
    cancel: Option<CancellationToken>,
}

impl RetirementOrchestrator {
    /// Orchestrator using the configured threshold and retirement channel.
    pub fn new(collaborators: Collaborators, config: &LifecycleConfig) -> Self {
        Self {
            collaborators,
            channel: config.retirement.target.clone(),
            policy: config.retirement_policy(),
            cancel: None,
        }
    }

    /// Skip identities not yet started once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run one retirement pass over every identity.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::DirectoryUnavailable`] if identities cannot be
    /// listed, [`LifecycleError::DeletionFailure`] if a stale key survives
    /// its deletion, [`LifecycleError::Directory`] for any other directory
    /// failure. A failure notification is published before returning.
    pub async fn run(&self, trigger: &TriggerContext) -> LifecycleResult<RetirementReport> {
        let notifier = self.collaborators.notifier.as_ref();

        match self.retire_all(trigger.reference_time).await {
            Ok(report) => {
                let event = LifecycleEvent::InactiveKeysDeleted {
                    deleted_keys: report.deleted.clone(),
                    timestamp: trigger.reference_time,
                };
                publish(notifier, &self.channel, &event).await;
                info!(
                    status = ?report.status,
                    deleted = report.deleted.len(),
                    "Retirement pass finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(kind = err.kind(), error = %err, "Retirement pass aborted");
                let event = LifecycleEvent::RetirementFailed {
                    error: err.to_string(),
                    event: trigger.event.clone(),
                };
                publish(notifier, &self.channel, &event).await;
                Err(err)
            }
        }
    }

    async fn retire_all(&self, now: DateTime<Utc>) -> LifecycleResult<RetirementReport> {
        let identities = self
            .collaborators
            .directory
            .list_identities()
            .await
            .map_err(|source| LifecycleError::DirectoryUnavailable { source })?;

        info!(
            identities = identities.len(),
            threshold_days = self.policy.threshold_days(),
            "Starting retirement pass"
        );

        let mut status = PassStatus::Completed;
        let mut deleted = Vec::new();

        for identity in &identities {
            if is_cancelled(self.cancel.as_ref()) {
                warn!(deleted = deleted.len(), "Retirement pass cancelled");
                status = PassStatus::Cancelled;
                break;
            }
            deleted.extend(self.retire_identity(identity, now).await?);
        }

        Ok(RetirementReport { status, deleted })
    }

    #[tracing::instrument(skip(self, now), fields(identity = %identity))]
    async fn retire_identity(
        &self,
        identity: &IdentityName,
        now: DateTime<Utc>,
    ) -> LifecycleResult<Vec<RetiredKey>> {
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

        let mut retired = Vec::new();
        for key in keys.iter().filter(|key| self.policy.applies_to(key)) {
            let last_used = directory
                .get_last_used(identity, &key.id)
                .await
                .map_err(|source| directory_error(DirectoryOperation::LastUsed, source))?;

            if !self.policy.is_eligible(last_used, now) {
                debug!(key_id = %key.id, ?last_used, "Inactive key still within threshold");
                continue;
            }

            directory
                .delete_key(identity, &key.id)
                .await
                .map_err(|source| LifecycleError::DeletionFailure {
                    identity: identity.clone(),
                    key_id: key.id.clone(),
                    source,
                })?;
            info!(key_id = %key.id, ?last_used, "Deleted stale inactive key");

            retired.push(RetiredKey {
                identity: identity.clone(),
                key_id: key.id.clone(),
                last_used,
            });
        }

        Ok(retired)
    }
}

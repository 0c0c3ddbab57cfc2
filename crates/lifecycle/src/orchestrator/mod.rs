//! Pass orchestration.
//!
//! [`RotationOrchestrator`] and [`RetirementOrchestrator`] apply the policy
//! decisions against the collaborator ports. [`KeyLifecycle`] wires both to
//! one set of collaborators and one configuration.

mod retirement;
mod rotation;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::LifecycleConfig;
use crate::error::LifecycleResult;
use crate::events::LifecycleEvent;
use crate::model::TriggerContext;
use crate::ports::{AuditLedger, ChannelId, DirectoryGateway, Notifier, SecretStore};
use crate::report::{RetirementReport, RotationReport};

pub use retirement::RetirementOrchestrator;
pub use rotation::RotationOrchestrator;

/// The four collaborators a pass drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Identity and key directory.
    pub directory: Arc<dyn DirectoryGateway>,
    /// Credential material store.
    pub secrets: Arc<dyn SecretStore>,
    /// Rotation history.
    pub audit: Arc<dyn AuditLedger>,
    /// Alert channel.
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Publish an event, logging instead of failing when the channel is down.
///
/// A lost failure alert is logged at `error`, anything else at `warn`.
pub(crate) async fn publish(notifier: &dyn Notifier, channel: &ChannelId, event: &LifecycleEvent) {
    let notification = event.to_notification(channel);
    if let Err(err) = notifier.publish(&notification).await {
        if event.is_failure() {
            error!(
                channel = %channel,
                subject = %notification.subject,
                error = %err,
                "Failed to publish failure notification"
            );
        } else {
            warn!(
                channel = %channel,
                subject = %notification.subject,
                error = %err,
                "Failed to publish notification"
            );
        }
    }
}

/// Returns `true` once `token` has fired.
pub(crate) fn is_cancelled(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}

/// Entry point for invokers: one rotation pass or one retirement pass.
#[derive(Debug, Clone)]
pub struct KeyLifecycle {
    rotation: RotationOrchestrator,
    retirement: RetirementOrchestrator,
}

impl KeyLifecycle {
    /// Wire both passes to the same collaborators.
    pub fn new(collaborators: Collaborators, config: &LifecycleConfig) -> Self {
        Self {
            rotation: RotationOrchestrator::new(collaborators.clone(), config),
            retirement: RetirementOrchestrator::new(collaborators, config),
        }
    }

    /// Stop both passes between identities once `token` fires.
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        Self {
            rotation: self.rotation.with_cancellation(token.clone()),
            retirement: self.retirement.with_cancellation(token),
        }
    }

    /// Rotate the active key of every identity.
    pub async fn run_rotation_pass(
        &self,
        trigger: &TriggerContext,
    ) -> LifecycleResult<RotationReport> {
        self.rotation.run(trigger).await
    }

    /// Delete stale inactive keys across every identity.
    pub async fn run_retirement_pass(
        &self,
        trigger: &TriggerContext,
    ) -> LifecycleResult<RetirementReport> {
        self.retirement.run(trigger).await
    }
}

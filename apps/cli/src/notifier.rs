//! Notifier that emits every notification as a tracing event.

use async_trait::async_trait;
use keyward_lifecycle::prelude::*;
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), PortError> {
        info!(
            target: "keyward::notify",
            channel = %notification.target,
            subject = %notification.subject,
            payload = %notification.payload,
            "notification"
        );
        Ok(())
    }
}

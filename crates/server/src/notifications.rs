use std::sync::Arc;

use tracing::info;
use tsm_core::domain::notification::{Notification, NotificationError, NotificationSink};

/// Writes every notification to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotificationSink;

impl NotificationSink for TracingNotificationSink {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            event_name = "notification.delivered",
            correlation_id = "notification",
            request_id = notification
                .related_request_id
                .as_ref()
                .map(|id| id.0.as_str())
                .unwrap_or("unknown"),
            user_id = %notification.user_id,
            kind = ?notification.kind,
            message = %notification.message,
            "user notification delivered"
        );
        Ok(())
    }
}

/// Delivers to every inner sink. All sinks are attempted; the first failure is reported.
#[derive(Clone, Default)]
pub struct FanoutNotificationSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotificationSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for FanoutNotificationSink {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(error) = sink.notify(notification.clone()) {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

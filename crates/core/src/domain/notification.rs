use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::request::RequestId;
use crate::domain::role::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Alert,
    Info,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub message: String,
    pub related_request_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        message: impl Into<String>,
        related_request_id: Option<RequestId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            kind,
            message: message.into(),
            related_request_id,
            created_at,
            read: false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// Fire-and-forget delivery. A failure never rolls back the transition that produced it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn all(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(notifications) => notifications.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Newest first, matching how an inbox is read.
    pub fn for_user(&self, user_id: &UserId) -> Vec<Notification> {
        let mut matching: Vec<_> =
            self.all().into_iter().filter(|notification| &notification.user_id == user_id).collect();
        matching.reverse();
        matching
    }

    /// Marks every notification of `user_id` as read. Returns how many were unread.
    pub fn mark_read(&self, user_id: &UserId) -> usize {
        let mut notifications = match self.notifications.lock() {
            Ok(notifications) => notifications,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut marked = 0;
        for notification in notifications.iter_mut() {
            if &notification.user_id == user_id && !notification.read {
                notification.read = true;
                marked += 1;
            }
        }
        marked
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        match self.notifications.lock() {
            Ok(mut notifications) => notifications.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
        Ok(())
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::billing::RateConfig;
use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::request::{
    ActionStatus, RequestId, RequestStatus, SpaceRequest, SpaceRequestDraft,
};
use crate::domain::role::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOperation {
    Submit,
    Approve,
    Reject,
    Vacate,
    Inspect,
}

impl LifecycleOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Vacate => "vacate",
            Self::Inspect => "inspect",
        }
    }
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionResult {
    Verified,
    Flagged,
}

impl InspectionResult {
    pub fn action_status(&self) -> ActionStatus {
        match self {
            Self::Verified => ActionStatus::Verified,
            Self::Flagged => ActionStatus::Flagged,
        }
    }

    pub fn resulting_status(&self) -> RequestStatus {
        match self {
            Self::Verified => RequestStatus::Completed,
            Self::Flagged => RequestStatus::Overstay,
        }
    }
}

/// Actor-initiated transition on an existing request. Submission is separate since it creates one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LifecycleCommand {
    Approve { comment: Option<String> },
    Reject { comment: Option<String> },
    Vacate,
    Inspect { result: InspectionResult, comment: Option<String> },
}

impl LifecycleCommand {
    pub fn operation(&self) -> LifecycleOperation {
        match self {
            Self::Approve { .. } => LifecycleOperation::Approve,
            Self::Reject { .. } => LifecycleOperation::Reject,
            Self::Vacate => LifecycleOperation::Vacate,
            Self::Inspect { .. } => LifecycleOperation::Inspect,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub id: RequestId,
    pub draft: SpaceRequestDraft,
    pub rates: RateConfig,
    pub annotation: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    NotifyUser {
        user_id: UserId,
        kind: NotificationKind,
        message: String,
        request_id: RequestId,
    },
}

impl LifecycleEvent {
    pub fn into_notification(self, created_at: DateTime<Utc>) -> Notification {
        match self {
            Self::NotifyUser { user_id, kind, message, request_id } => {
                Notification::new(user_id, kind, message, Some(request_id), created_at)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub request: SpaceRequest,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub operation: LifecycleOperation,
    pub events: Vec<LifecycleEvent>,
}

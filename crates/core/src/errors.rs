use std::fmt;

use thiserror::Error;

use crate::domain::request::{RequestId, RequestStatus};
use crate::domain::role::{Role, UserId};
use crate::lifecycle::LifecycleOperation;
use crate::permissions::Capability;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationIssue>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> =
            self.0.iter().map(|issue| format!("{} {}", issue.field, issue.message)).collect();
        f.write_str(&rendered.join("; "))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuardViolation {
    #[error("role {role} is not part of the approval chain")]
    RoleNotInChain { role: Role },
    #[error("role {role} is not the current approver (awaiting {})", display_expected(.expected))]
    NotCurrentApprover { role: Role, expected: Option<Role> },
    #[error("role {role} is not allowed to {}", .capability.as_str())]
    MissingCapability { role: Role, capability: Capability },
    #[error("user {actor_id} is not the requester ({requester_id})")]
    NotRequester { actor_id: UserId, requester_id: UserId },
}

fn display_expected(expected: &Option<Role>) -> String {
    expected.map(|role| role.to_string()).unwrap_or_else(|| "no approver".to_string())
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("guard violation: {0}")]
    Guard(#[from] GuardViolation),
    #[error("cannot {operation} request {request_id} while it is {status}")]
    InvalidTransition { request_id: RequestId, status: RequestStatus, operation: LifecycleOperation },
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<ValidationErrors> for LifecycleError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] LifecycleError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("request {0} already has an action in progress")]
    Busy(RequestId),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn request_not_found(id: &RequestId) -> Self {
        Self::NotFound { entity: "request", id: id.0.clone() }
    }

    pub fn user_not_found(id: &UserId) -> Self {
        Self::NotFound { entity: "user", id: id.0.clone() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action right now.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The request is not in a state that allows this action. Refresh and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        let message = value.to_string();
        match value {
            ApplicationError::Domain(LifecycleError::Validation(_)) => {
                Self::BadRequest { message, correlation_id }
            }
            ApplicationError::Domain(LifecycleError::Guard(_)) => {
                Self::Forbidden { message, correlation_id }
            }
            ApplicationError::Domain(LifecycleError::InvalidTransition { .. })
            | ApplicationError::Busy(_) => Self::Conflict { message, correlation_id },
            ApplicationError::NotFound { .. } => Self::NotFound { message, correlation_id },
            ApplicationError::Persistence(_) | ApplicationError::Integration(_) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Domain(LifecycleError::InvariantViolation(_))
            | ApplicationError::Configuration(_) => Self::Internal { message, correlation_id },
        }
    }
}

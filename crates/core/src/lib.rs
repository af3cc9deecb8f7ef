pub mod annotation;
pub mod audit;
pub mod billing;
pub mod chain;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod permissions;
pub mod sweeper;

pub use annotation::{AnnotationMode, AnnotationProvider, FootprintAnnotation, NoAnnotation};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use billing::{RateCalculator, RateConfig, RateConfigProvider, RateQuote, StaticRateConfigProvider};
pub use chain::{ApprovalChain, ChainError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::notification::{
    InMemoryNotificationSink, Notification, NotificationError, NotificationKind, NotificationSink,
};
pub use domain::request::{
    ActionStatus, ApprovalAction, RequestId, RequestStatus, SpaceRequest, SpaceRequestDraft,
};
pub use domain::role::{Actor, Role, User, UserId};
pub use errors::{ApplicationError, GuardViolation, InterfaceError, LifecycleError};
pub use lifecycle::{
    InspectionResult, LifecycleCommand, LifecycleEvent, LifecycleOperation, RequestLifecycle,
    Submission, TransitionOutcome,
};
pub use permissions::{Capability, PermissionTable};
pub use sweeper::{ExpirySweeper, SweepReport};

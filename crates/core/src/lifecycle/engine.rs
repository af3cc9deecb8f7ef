use chrono::{DateTime, Utc};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::billing::RateCalculator;
use crate::chain::ApprovalChain;
use crate::domain::notification::NotificationKind;
use crate::domain::request::{
    ActionStatus, ApprovalAction, RequestStatus, SpaceRequest, SpaceRequestDraft,
};
use crate::domain::role::{Actor, Role};
use crate::errors::{GuardViolation, LifecycleError};
use crate::lifecycle::states::{
    InspectionResult, LifecycleCommand, LifecycleEvent, LifecycleOperation, Submission,
    TransitionOutcome,
};
use crate::permissions::{Capability, PermissionTable};

/// Applies lifecycle transitions to request snapshots. Inputs are never mutated; every successful
/// call returns a new snapshot together with the events the caller must forward.
#[derive(Clone, Debug)]
pub struct RequestLifecycle {
    chain: ApprovalChain,
    inspection_role: Role,
    permissions: PermissionTable,
    calculator: RateCalculator,
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new(ApprovalChain::default(), Role::IePlant)
    }
}

impl RequestLifecycle {
    pub fn new(chain: ApprovalChain, inspection_role: Role) -> Self {
        let permissions = PermissionTable::new(&chain, inspection_role);
        Self { chain, inspection_role, permissions, calculator: RateCalculator }
    }

    pub fn chain(&self) -> &ApprovalChain {
        &self.chain
    }

    pub fn inspection_role(&self) -> Role {
        self.inspection_role
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    /// Draft → Pending in one step. Price and annotation are frozen here.
    pub fn submit(
        &self,
        actor: &Actor,
        submission: Submission,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.require(actor, Capability::Submit)?;
        let draft = submission.draft.validate()?;

        let quote = self.calculator.quote_for_dates(
            draft.length,
            draft.width,
            draft.date_in,
            draft.date_out,
            &submission.rates,
        );

        let request = SpaceRequest {
            id: submission.id,
            requester_id: actor.id.clone(),
            requester_name: actor.name.clone(),
            machine_name: draft.machine_name,
            serial_number: draft.serial_number,
            work_cell: draft.work_cell,
            cost_center: draft.cost_center,
            length: draft.length,
            width: draft.width,
            height: draft.height,
            date_in: draft.date_in,
            date_out: draft.date_out,
            billable_area: quote.area,
            calculated_rate: quote.amount,
            currency: quote.currency,
            status: RequestStatus::Pending,
            current_approver_role: Some(self.chain.first()),
            approval_history: Vec::new(),
            annotation: normalize_text(submission.annotation),
            created_at: submission.submitted_at,
        };

        Ok(TransitionOutcome {
            request,
            from: RequestStatus::Draft,
            to: RequestStatus::Pending,
            operation: LifecycleOperation::Submit,
            events: Vec::new(),
        })
    }

    pub fn apply(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
        command: LifecycleCommand,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        match command {
            LifecycleCommand::Approve { comment } => self.approve(request, actor, comment, at),
            LifecycleCommand::Reject { comment } => self.reject(request, actor, comment, at),
            LifecycleCommand::Vacate => self.vacate(request, actor),
            LifecycleCommand::Inspect { result, comment } => {
                self.inspect(request, actor, result, comment, at)
            }
        }
    }

    pub fn apply_with_audit<S>(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
        command: LifecycleCommand,
        at: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, LifecycleError>
    where
        S: AuditSink + ?Sized,
    {
        let operation = command.operation();
        let result = self.apply(request, actor, command, at);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "lifecycle.transition_applied",
                        AuditCategory::Lifecycle,
                        AuditOutcome::Success,
                    )
                    .with_metadata("operation", operation.as_str())
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("role", actor.role.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "lifecycle.transition_rejected",
                        AuditCategory::Lifecycle,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("operation", operation.as_str())
                    .with_metadata("role", actor.role.as_str())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }

    pub fn approve(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.decide(request, actor, ActionStatus::Approved, comment, at)
    }

    pub fn reject(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.decide(request, actor, ActionStatus::Rejected, comment, at)
    }

    /// Requester reports the space as cleared; only an expired lease can be vacated.
    pub fn vacate(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.require(actor, Capability::Vacate)?;
        require_requester(request, actor)?;
        require_status(request, RequestStatus::Expired, LifecycleOperation::Vacate)?;

        let mut next = request.clone();
        next.status = RequestStatus::AwaitingInspection;

        Ok(TransitionOutcome {
            request: next,
            from: request.status,
            to: RequestStatus::AwaitingInspection,
            operation: LifecycleOperation::Vacate,
            events: Vec::new(),
        })
    }

    pub fn inspect(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
        result: InspectionResult,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        self.require(actor, Capability::Inspect)?;
        require_status(request, RequestStatus::AwaitingInspection, LifecycleOperation::Inspect)?;

        let mut next = request.clone();
        next.approval_history.push(action(request, actor, result.action_status(), comment, at));
        next.status = result.resulting_status();

        let (kind, message) = match result {
            InspectionResult::Verified => (
                NotificationKind::Success,
                format!(
                    "SYSTEM NOTIFICATION: Inspection for [{}] complete. Clearance verified. Please remove item immediately.",
                    request.machine_name
                ),
            ),
            InspectionResult::Flagged => (
                NotificationKind::Alert,
                format!(
                    "SYSTEM ALERT: Issue detected for [{}] during inspection. Item must remain on site. Extended billing charges applying.",
                    request.machine_name
                ),
            ),
        };

        Ok(TransitionOutcome {
            from: request.status,
            to: next.status,
            operation: LifecycleOperation::Inspect,
            events: vec![LifecycleEvent::NotifyUser {
                user_id: request.requester_id.clone(),
                kind,
                message,
                request_id: request.id.clone(),
            }],
            request: next,
        })
    }

    /// New draft for re-submitting the same equipment. The original request is left untouched.
    pub fn renewal_draft(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
    ) -> Result<SpaceRequestDraft, LifecycleError> {
        self.require(actor, Capability::Renew)?;
        require_requester(request, actor)?;
        Ok(SpaceRequestDraft::renewal_of(request))
    }

    fn decide(
        &self,
        request: &SpaceRequest,
        actor: &Actor,
        decision: ActionStatus,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let operation = match decision {
            ActionStatus::Approved => LifecycleOperation::Approve,
            _ => LifecycleOperation::Reject,
        };

        let position = self
            .chain
            .position(actor.role)
            .map_err(|_| GuardViolation::RoleNotInChain { role: actor.role })?;

        if request.current_approver_role != Some(actor.role) {
            return Err(GuardViolation::NotCurrentApprover {
                role: actor.role,
                expected: request.current_approver_role,
            }
            .into());
        }

        if request.status != RequestStatus::Pending {
            return Err(LifecycleError::InvariantViolation(format!(
                "request {} awaits {} while {}",
                request.id, actor.role, request.status
            )));
        }

        let mut next = request.clone();
        next.approval_history.push(action(request, actor, decision, comment, at));

        match (decision, self.chain.roles().get(position + 1)) {
            (ActionStatus::Approved, Some(successor)) => {
                next.current_approver_role = Some(*successor);
            }
            (ActionStatus::Approved, None) => {
                next.current_approver_role = None;
                next.status = RequestStatus::Approved;
            }
            _ => {
                next.current_approver_role = None;
                next.status = RequestStatus::Rejected;
            }
        }

        Ok(TransitionOutcome {
            from: request.status,
            to: next.status,
            operation,
            events: Vec::new(),
            request: next,
        })
    }

    fn require(&self, actor: &Actor, capability: Capability) -> Result<(), GuardViolation> {
        if self.permissions.allows(actor.role, capability) {
            Ok(())
        } else {
            Err(GuardViolation::MissingCapability { role: actor.role, capability })
        }
    }
}

fn require_requester(request: &SpaceRequest, actor: &Actor) -> Result<(), GuardViolation> {
    if request.requester_id == actor.id {
        Ok(())
    } else {
        Err(GuardViolation::NotRequester {
            actor_id: actor.id.clone(),
            requester_id: request.requester_id.clone(),
        })
    }
}

fn require_status(
    request: &SpaceRequest,
    expected: RequestStatus,
    operation: LifecycleOperation,
) -> Result<(), LifecycleError> {
    if request.status == expected {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            request_id: request.id.clone(),
            status: request.status,
            operation,
        })
    }
}

fn action(
    request: &SpaceRequest,
    actor: &Actor,
    status: ActionStatus,
    comment: Option<String>,
    at: DateTime<Utc>,
) -> ApprovalAction {
    // History stays chronological even if the caller's clock lags the last entry.
    let timestamp = request.last_action().map_or(at, |last| at.max(last.timestamp));
    ApprovalAction {
        role: actor.role,
        approver_id: actor.id.clone(),
        approver_name: actor.name.clone(),
        status,
        timestamp,
        comment: normalize_text(comment),
    }
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

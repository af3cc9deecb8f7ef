//! Caller layer around the request lifecycle: loads snapshots, guards concurrent mutations,
//! persists results and forwards lifecycle events once the save succeeded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tsm_core::annotation::AnnotationProvider;
use tsm_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use tsm_core::billing::{RateCalculator, RateConfigProvider, RateQuote};
use tsm_core::clock::Clock;
use tsm_core::domain::notification::NotificationSink;
use tsm_core::domain::request::{RequestId, SpaceRequest, SpaceRequestDraft};
use tsm_core::domain::role::{Actor, UserId};
use tsm_core::errors::{ApplicationError, LifecycleError, ValidationErrors, ValidationIssue};
use tsm_core::lifecycle::{LifecycleCommand, RequestLifecycle, Submission, TransitionOutcome};
use tsm_core::sweeper::ExpirySweeper;
use tsm_db::repositories::{RepositoryError, RequestRepository, UserDirectory};

/// Collaborators the workflow delegates to. Every one of them is swappable in tests.
#[derive(Clone)]
pub struct WorkflowCollaborators {
    pub requests: Arc<dyn RequestRepository>,
    pub users: Arc<dyn UserDirectory>,
    pub rates: Arc<dyn RateConfigProvider>,
    pub notifications: Arc<dyn NotificationSink>,
    pub annotations: Arc<dyn AnnotationProvider>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct WorkflowService {
    collaborators: WorkflowCollaborators,
    lifecycle: RequestLifecycle,
    sweeper: ExpirySweeper,
    calculator: RateCalculator,
    action_delay: Duration,
    in_flight: Mutex<HashSet<String>>,
}

/// Holds a request id in the in-flight set until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        match self.in_flight.lock() {
            Ok(mut ids) => ids.remove(&self.id),
            Err(poisoned) => poisoned.into_inner().remove(&self.id),
        };
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

impl WorkflowService {
    pub fn new(
        collaborators: WorkflowCollaborators,
        lifecycle: RequestLifecycle,
        action_delay: Duration,
    ) -> Self {
        Self {
            collaborators,
            lifecycle,
            sweeper: ExpirySweeper,
            calculator: RateCalculator,
            action_delay,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn lifecycle(&self) -> &RequestLifecycle {
        &self.lifecycle
    }

    pub async fn list_requests(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<SpaceRequest>, ApplicationError> {
        self.sweep(correlation_id).await?;
        self.collaborators.requests.list().await.map_err(persistence)
    }

    pub async fn get_request(
        &self,
        id: &RequestId,
        correlation_id: &str,
    ) -> Result<SpaceRequest, ApplicationError> {
        self.load_swept(id, correlation_id).await
    }

    /// Reclassifies every overdue approved request and persists the changed ones.
    pub async fn sweep(&self, correlation_id: &str) -> Result<Vec<RequestId>, ApplicationError> {
        let today = self.collaborators.clock.today();
        let requests = self.collaborators.requests.list().await.map_err(persistence)?;
        let report = self.sweeper.sweep(requests, today);

        for request in report.changed() {
            self.collaborators.requests.save(request.clone()).await.map_err(persistence)?;
            self.record_expiry(&request.id, correlation_id, today);
        }

        if !report.expired_ids.is_empty() {
            info!(
                event_name = "sweep.completed",
                correlation_id = %correlation_id,
                request_id = "batch",
                expired_count = report.expired_ids.len(),
                "expiry sweep reclassified requests"
            );
        }

        Ok(report.expired_ids)
    }

    pub async fn submit(
        &self,
        actor_id: &UserId,
        draft: SpaceRequestDraft,
        annotation: Option<String>,
        correlation_id: &str,
    ) -> Result<SpaceRequest, ApplicationError> {
        let actor = self.resolve_actor(actor_id).await?;

        let annotation = match annotation.filter(|text| !text.trim().is_empty()) {
            Some(text) => Some(text),
            None => self.collaborators.annotations.annotate(&draft).await,
        };

        let submission = Submission {
            id: RequestId::generate(),
            draft,
            rates: self.collaborators.rates.current(),
            annotation,
            submitted_at: self.collaborators.clock.now(),
        };
        let audit = AuditContext::new(Some(submission.id.clone()), correlation_id, actor.id.0.clone());

        let outcome = match self.lifecycle.submit(&actor, submission) {
            Ok(outcome) => outcome,
            Err(error) => {
                self.collaborators.audit.emit(
                    AuditEvent::from_context(
                        &audit,
                        "lifecycle.submission_rejected",
                        AuditCategory::Lifecycle,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        self.collaborators.requests.save(outcome.request.clone()).await.map_err(persistence)?;
        self.collaborators.audit.emit(
            AuditEvent::from_context(
                &audit,
                "lifecycle.request_submitted",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
            )
            .with_metadata("amount", outcome.request.calculated_rate.to_string())
            .with_metadata("currency", outcome.request.currency.clone()),
        );
        info!(
            event_name = "lifecycle.request_submitted",
            correlation_id = %correlation_id,
            request_id = %outcome.request.id,
            actor_id = %actor.id,
            amount = %outcome.request.calculated_rate,
            "space request submitted"
        );

        Ok(outcome.request)
    }

    /// Applies an actor command to a stored request. At most one mutation per request runs at a
    /// time; a concurrent caller gets `Busy`.
    pub async fn transition(
        &self,
        id: &RequestId,
        actor_id: &UserId,
        command: LifecycleCommand,
        correlation_id: &str,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let _guard = self.acquire(id)?;

        if !self.action_delay.is_zero() {
            tokio::time::sleep(self.action_delay).await;
        }

        let request = self.load_swept(id, correlation_id).await?;
        let actor = self.resolve_actor(actor_id).await?;
        let audit = AuditContext::new(Some(id.clone()), correlation_id, actor.id.0.clone());
        let operation = command.operation();

        let outcome = self
            .lifecycle
            .apply_with_audit(
                &request,
                &actor,
                command,
                self.collaborators.clock.now(),
                self.collaborators.audit.as_ref(),
                &audit,
            )
            .map_err(|error| {
                warn!(
                    event_name = "lifecycle.transition_rejected",
                    correlation_id = %correlation_id,
                    request_id = %id,
                    actor_id = %actor.id,
                    operation = %operation,
                    error = %error,
                    "lifecycle transition rejected"
                );
                ApplicationError::from(error)
            })?;

        self.collaborators.requests.save(outcome.request.clone()).await.map_err(persistence)?;
        info!(
            event_name = "lifecycle.transition_applied",
            correlation_id = %correlation_id,
            request_id = %id,
            actor_id = %actor.id,
            operation = %operation,
            from = %outcome.from,
            to = %outcome.to,
            "lifecycle transition applied"
        );

        self.forward_events(&outcome, correlation_id);
        Ok(outcome)
    }

    pub async fn renewal_draft(
        &self,
        id: &RequestId,
        actor_id: &UserId,
        correlation_id: &str,
    ) -> Result<SpaceRequestDraft, ApplicationError> {
        let request = self.load_swept(id, correlation_id).await?;
        let actor = self.resolve_actor(actor_id).await?;
        Ok(self.lifecycle.renewal_draft(&request, &actor)?)
    }

    /// Live price for a prospective request using the current rate configuration.
    pub fn estimate(
        &self,
        length: Decimal,
        width: Decimal,
        date_in: NaiveDate,
        date_out: NaiveDate,
    ) -> Result<RateQuote, ApplicationError> {
        let mut issues = Vec::new();
        if length <= Decimal::ZERO {
            issues.push(ValidationIssue::new("length", "must be greater than zero"));
        }
        if width <= Decimal::ZERO {
            issues.push(ValidationIssue::new("width", "must be greater than zero"));
        }
        if date_out < date_in {
            issues.push(ValidationIssue::new("date_out", "must not precede date_in"));
        }
        if !issues.is_empty() {
            return Err(LifecycleError::from(ValidationErrors(issues)).into());
        }

        let rates = self.collaborators.rates.current();
        Ok(self.calculator.quote_for_dates(length, width, date_in, date_out, &rates))
    }

    pub async fn resolve_actor(&self, actor_id: &UserId) -> Result<Actor, ApplicationError> {
        self.collaborators
            .users
            .resolve_actor(actor_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::user_not_found(actor_id))
    }

    /// Periodic sweep until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(error) = service.sweep("sweeper").await {
                    warn!(
                        event_name = "sweep.failed",
                        correlation_id = "sweeper",
                        request_id = "batch",
                        error = %error,
                        "periodic expiry sweep failed"
                    );
                }
            }
        })
    }

    fn acquire(&self, id: &RequestId) -> Result<InFlightGuard<'_>, ApplicationError> {
        let inserted = match self.in_flight.lock() {
            Ok(mut ids) => ids.insert(id.0.clone()),
            Err(poisoned) => poisoned.into_inner().insert(id.0.clone()),
        };
        if !inserted {
            return Err(ApplicationError::Busy(id.clone()));
        }
        Ok(InFlightGuard { in_flight: &self.in_flight, id: id.0.clone() })
    }

    /// Loads one request and applies the expiry sweep to it before anything else looks at it.
    async fn load_swept(
        &self,
        id: &RequestId,
        correlation_id: &str,
    ) -> Result<SpaceRequest, ApplicationError> {
        let request = self
            .collaborators
            .requests
            .get(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::request_not_found(id))?;

        let today = self.collaborators.clock.today();
        match self.sweeper.sweep_one(&request, today) {
            Some(expired) => {
                self.collaborators.requests.save(expired.clone()).await.map_err(persistence)?;
                self.record_expiry(id, correlation_id, today);
                Ok(expired)
            }
            None => Ok(request),
        }
    }

    fn record_expiry(&self, id: &RequestId, correlation_id: &str, today: NaiveDate) {
        self.collaborators.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                correlation_id,
                "sweep.request_expired",
                AuditCategory::Sweep,
                "system",
                AuditOutcome::Success,
            )
            .with_metadata("swept_on", today.to_string()),
        );
    }

    fn forward_events(&self, outcome: &TransitionOutcome, correlation_id: &str) {
        let now = self.collaborators.clock.now();
        for event in outcome.events.iter().cloned() {
            let notification = event.into_notification(now);
            let user_id = notification.user_id.clone();
            if let Err(error) = self.collaborators.notifications.notify(notification) {
                warn!(
                    event_name = "notification.delivery_failed",
                    correlation_id = %correlation_id,
                    request_id = %outcome.request.id,
                    user_id = %user_id,
                    error = %error,
                    "notification delivery failed; transition kept"
                );
                self.collaborators.audit.emit(
                    AuditEvent::new(
                        Some(outcome.request.id.clone()),
                        correlation_id,
                        "notification.delivery_failed",
                        AuditCategory::Notification,
                        "system",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("user_id", user_id.0),
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use tsm_core::annotation::{FootprintAnnotation, NoAnnotation};
    use tsm_core::audit::{AuditOutcome, InMemoryAuditSink};
    use tsm_core::billing::{RateConfig, StaticRateConfigProvider};
    use tsm_core::clock::FixedClock;
    use tsm_core::domain::notification::{
        InMemoryNotificationSink, Notification, NotificationError, NotificationKind,
        NotificationSink,
    };
    use tsm_core::domain::request::{RequestId, RequestStatus, SpaceRequest, SpaceRequestDraft};
    use tsm_core::domain::role::{Role, UserId};
    use tsm_core::errors::{ApplicationError, GuardViolation, LifecycleError};
    use tsm_core::lifecycle::{InspectionResult, LifecycleCommand, RequestLifecycle};
    use tsm_db::fixtures::SeedDataset;
    use tsm_db::repositories::{
        InMemoryRequestRepository, InMemoryUserDirectory, RepositoryError, RequestRepository,
    };

    use super::{WorkflowCollaborators, WorkflowService};

    pub(crate) fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).expect("date")
    }

    pub(crate) struct Harness {
        pub service: Arc<WorkflowService>,
        pub requests: Arc<InMemoryRequestRepository>,
        pub inbox: InMemoryNotificationSink,
        pub audit: InMemoryAuditSink,
    }

    pub(crate) fn harness_with(
        notifications: Option<Arc<dyn NotificationSink>>,
        action_delay: Duration,
    ) -> Harness {
        let requests = Arc::new(InMemoryRequestRepository::with_requests(SeedDataset::requests(
            today(),
        )));
        let inbox = InMemoryNotificationSink::default();
        let audit = InMemoryAuditSink::default();
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("now"));

        let collaborators = WorkflowCollaborators {
            requests: requests.clone(),
            users: Arc::new(InMemoryUserDirectory::with_users(SeedDataset::users())),
            rates: Arc::new(StaticRateConfigProvider::new(RateConfig::default())),
            notifications: notifications.unwrap_or_else(|| Arc::new(inbox.clone())),
            annotations: Arc::new(NoAnnotation),
            audit: Arc::new(audit.clone()),
            clock: Arc::new(clock),
        };

        Harness {
            service: Arc::new(WorkflowService::new(
                collaborators,
                RequestLifecycle::default(),
                action_delay,
            )),
            requests,
            inbox,
            audit,
        }
    }

    pub(crate) fn harness() -> Harness {
        harness_with(None, Duration::ZERO)
    }

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn id(raw: &str) -> RequestId {
        RequestId(raw.to_string())
    }

    fn draft() -> SpaceRequestDraft {
        SpaceRequestDraft {
            machine_name: "CNC Lathe".to_string(),
            serial_number: "CNC-77".to_string(),
            work_cell: "Machining".to_string(),
            cost_center: "CC-MFG-001".to_string(),
            length: Decimal::new(25, 1),
            width: Decimal::new(15, 1),
            height: Decimal::new(2, 0),
            date_in: NaiveDate::from_ymd_opt(2025, 3, 1),
            date_out: NaiveDate::from_ymd_opt(2025, 3, 15),
        }
    }

    async fn approve_through_chain(service: &WorkflowService, request_id: &RequestId) {
        for approver in ["u3", "u4", "u5", "u6"] {
            service
                .transition(
                    request_id,
                    &user(approver),
                    LifecycleCommand::Approve { comment: None },
                    "test",
                )
                .await
                .expect("approve in order");
        }
    }

    #[tokio::test]
    async fn submit_persists_pending_request_with_frozen_price() {
        let h = harness();
        let request =
            h.service.submit(&user("u2"), draft(), None, "corr-1").await.expect("submit");

        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.current_approver_role, Some(Role::Bum));
        assert_eq!(request.calculated_rate, Decimal::new(2_373_462, 3));
        assert_eq!(h.requests.get(&request.id).await.expect("get"), Some(request.clone()));
        assert!(h
            .audit
            .events()
            .iter()
            .any(|event| event.event_type == "lifecycle.request_submitted"
                && event.correlation_id == "corr-1"));
    }

    #[tokio::test]
    async fn submit_uses_annotation_provider_only_without_caller_text() {
        let h = harness();
        let service = WorkflowService::new(
            WorkflowCollaborators {
                annotations: Arc::new(FootprintAnnotation),
                ..h.service.collaborators.clone()
            },
            RequestLifecycle::default(),
            Duration::ZERO,
        );

        let generated = service
            .submit(&user("u2"), draft(), None, "corr")
            .await
            .expect("submit");
        assert_eq!(generated.annotation.as_deref(), Some("Footprint 2.5 x 1.5 x 2 for CNC Lathe."));

        let supplied = service
            .submit(&user("u2"), draft(), Some("Fragile".to_string()), "corr")
            .await
            .expect("submit");
        assert_eq!(supplied.annotation.as_deref(), Some("Fragile"));
    }

    #[tokio::test]
    async fn unknown_actor_is_not_found() {
        let h = harness();
        let error = h
            .service
            .submit(&user("ghost"), draft(), None, "corr")
            .await
            .expect_err("unknown actor");
        assert!(matches!(error, ApplicationError::NotFound { entity: "user", .. }));
    }

    #[tokio::test]
    async fn invalid_draft_is_never_persisted() {
        let h = harness();
        let before = h.requests.list().await.expect("list").len();
        let mut invalid = draft();
        invalid.width = Decimal::ZERO;

        let error =
            h.service.submit(&user("u2"), invalid, None, "corr").await.expect_err("invalid");

        assert!(matches!(error, ApplicationError::Domain(LifecycleError::Validation(_))));
        assert_eq!(h.requests.list().await.expect("list").len(), before);
    }

    #[tokio::test]
    async fn full_lifecycle_through_inspection_notifies_requester() {
        let h = harness();
        let request = h.service.submit(&user("u2"), draft(), None, "corr").await.expect("submit");
        approve_through_chain(&h.service, &request.id).await;

        let mut stored = h.requests.get(&request.id).await.expect("get").expect("present");
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.approval_history.len(), 4);

        stored.date_out = NaiveDate::from_ymd_opt(2025, 2, 27).expect("date");
        stored.date_in = NaiveDate::from_ymd_opt(2025, 2, 1).expect("date");
        h.requests.save(stored).await.expect("backdate");

        let vacated = h
            .service
            .transition(&request.id, &user("u2"), LifecycleCommand::Vacate, "corr")
            .await
            .expect("vacate after sweep");
        assert_eq!(vacated.from, RequestStatus::Expired);
        assert_eq!(vacated.to, RequestStatus::AwaitingInspection);

        let inspected = h
            .service
            .transition(
                &request.id,
                &user("u6"),
                LifecycleCommand::Inspect { result: InspectionResult::Flagged, comment: None },
                "corr",
            )
            .await
            .expect("inspect");
        assert_eq!(inspected.to, RequestStatus::Overstay);

        let inbox = h.inbox.for_user(&user("u2"));
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::Alert);
        assert_eq!(inbox[0].related_request_id.as_ref(), Some(&request.id));
    }

    #[tokio::test]
    async fn out_of_turn_approval_is_forbidden_and_leaves_storage_untouched() {
        let h = harness();
        let before = h.requests.get(&id("REQ-1001")).await.expect("get");

        let error = h
            .service
            .transition(
                &id("REQ-1001"),
                &user("u4"),
                LifecycleCommand::Approve { comment: None },
                "corr",
            )
            .await
            .expect_err("wcm is out of turn");

        assert_eq!(
            error,
            ApplicationError::Domain(LifecycleError::Guard(GuardViolation::NotCurrentApprover {
                role: Role::Wcm,
                expected: Some(Role::Bum),
            }))
        );
        assert_eq!(h.requests.get(&id("REQ-1001")).await.expect("get"), before);
        assert!(h
            .audit
            .events()
            .iter()
            .any(|event| event.outcome == AuditOutcome::Rejected));
    }

    #[tokio::test]
    async fn listing_sweeps_overdue_approvals_first() {
        let h = harness();
        let mut approved = h.requests.get(&id("REQ-1002")).await.expect("get").expect("seed");
        approved.date_out = NaiveDate::from_ymd_opt(2025, 2, 28).expect("date");
        h.requests.save(approved).await.expect("backdate");

        let listed = h.service.list_requests("corr").await.expect("list");
        let swept = listed.iter().find(|request| request.id == id("REQ-1002")).expect("present");
        assert_eq!(swept.status, RequestStatus::Expired);

        assert!(h.service.sweep("corr").await.expect("second sweep").is_empty());
    }

    #[tokio::test]
    async fn concurrent_mutations_on_one_request_are_busy() {
        let h = harness_with(None, Duration::from_millis(50));
        let target = id("REQ-1001");
        let first_user = user("u3");
        let second_user = user("u3");

        let (first, second) = tokio::join!(
            h.service.transition(
                &target,
                &first_user,
                LifecycleCommand::Approve { comment: None },
                "first"
            ),
            h.service.transition(
                &target,
                &second_user,
                LifecycleCommand::Approve { comment: None },
                "second"
            ),
        );

        assert!(first.is_ok());
        assert_eq!(second.expect_err("second caller"), ApplicationError::Busy(target.clone()));

        let third = h
            .service
            .transition(&target, &user("u4"), LifecycleCommand::Approve { comment: None }, "third")
            .await
            .expect("guard released after completion");
        assert_eq!(third.request.current_approver_role, Some(Role::MfgFm));
    }

    struct BrokenSink;

    impl NotificationSink for BrokenSink {
        fn notify(&self, _notification: Notification) -> Result<(), NotificationError> {
            Err(NotificationError("smtp down".to_string()))
        }
    }

    #[tokio::test]
    async fn notification_failure_keeps_the_transition() {
        let h = harness_with(Some(Arc::new(BrokenSink)), Duration::ZERO);
        let expired = id("REQ-1004");

        h.service
            .transition(&expired, &user("u2"), LifecycleCommand::Vacate, "corr")
            .await
            .expect("vacate");
        let outcome = h
            .service
            .transition(
                &expired,
                &user("u6"),
                LifecycleCommand::Inspect { result: InspectionResult::Verified, comment: None },
                "corr",
            )
            .await
            .expect("inspection succeeds even if delivery fails");

        assert_eq!(outcome.to, RequestStatus::Completed);
        let stored = h.requests.get(&expired).await.expect("get").expect("present");
        assert_eq!(stored.status, RequestStatus::Completed);
        assert!(h
            .audit
            .events()
            .iter()
            .any(|event| event.event_type == "notification.delivery_failed"));
    }

    struct FailingRepository;

    #[async_trait]
    impl RequestRepository for FailingRepository {
        async fn list(&self) -> Result<Vec<SpaceRequest>, RepositoryError> {
            Err(RepositoryError::Decode("disk unavailable".to_string()))
        }

        async fn get(&self, _id: &RequestId) -> Result<Option<SpaceRequest>, RepositoryError> {
            Err(RepositoryError::Decode("disk unavailable".to_string()))
        }

        async fn save(&self, _request: SpaceRequest) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("disk unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn repository_failures_surface_as_persistence_errors() {
        let h = harness();
        let service = WorkflowService::new(
            WorkflowCollaborators {
                requests: Arc::new(FailingRepository),
                ..h.service.collaborators.clone()
            },
            RequestLifecycle::default(),
            Duration::ZERO,
        );

        let error = service.submit(&user("u2"), draft(), None, "corr").await.expect_err("save");
        assert!(matches!(error, ApplicationError::Persistence(_)));
        assert!(h.inbox.all().is_empty());
    }

    /// Reads from the wrapped store; every write fails.
    struct ReadOnlyRepository(Arc<InMemoryRequestRepository>);

    #[async_trait]
    impl RequestRepository for ReadOnlyRepository {
        async fn list(&self) -> Result<Vec<SpaceRequest>, RepositoryError> {
            self.0.list().await
        }

        async fn get(&self, id: &RequestId) -> Result<Option<SpaceRequest>, RepositoryError> {
            self.0.get(id).await
        }

        async fn save(&self, _request: SpaceRequest) -> Result<(), RepositoryError> {
            Err(RepositoryError::Decode("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_save_discards_transition_and_its_notifications() {
        let h = harness();
        let expired = id("REQ-1004");
        h.service
            .transition(&expired, &user("u2"), LifecycleCommand::Vacate, "corr")
            .await
            .expect("vacate");
        let before = h.requests.get(&expired).await.expect("get").expect("present");
        let delivered = h.inbox.all().len();

        let service = WorkflowService::new(
            WorkflowCollaborators {
                requests: Arc::new(ReadOnlyRepository(h.requests.clone())),
                ..h.service.collaborators.clone()
            },
            RequestLifecycle::default(),
            Duration::ZERO,
        );
        let error = service
            .transition(
                &expired,
                &user("u6"),
                LifecycleCommand::Inspect { result: InspectionResult::Flagged, comment: None },
                "corr",
            )
            .await
            .expect_err("save fails");

        assert!(matches!(error, ApplicationError::Persistence(_)));
        assert_eq!(h.inbox.all().len(), delivered);
        let after = h.requests.get(&expired).await.expect("get").expect("present");
        assert_eq!(after, before);
        assert_eq!(after.status, RequestStatus::AwaitingInspection);
    }

    #[tokio::test]
    async fn renewal_draft_copies_equipment() {
        let h = harness();
        let renewal =
            h.service.renewal_draft(&id("REQ-1004"), &user("u2"), "corr").await.expect("renewal");
        assert_eq!(renewal.machine_name, "Expired Test Machine");
        assert_eq!(renewal.date_in, None);
    }

    #[test]
    fn estimate_validates_inputs_and_prices_same_day_as_one() {
        let h = harness();
        let day = today();

        let quote =
            h.service.estimate(Decimal::new(25, 1), Decimal::new(15, 1), day, day).expect("quote");
        assert_eq!(quote.billable_days, 1);
        assert_eq!(quote.amount, Decimal::new(169_533, 3));
        assert_eq!(quote.display_amount, Decimal::new(16_953, 2));

        let error = h
            .service
            .estimate(Decimal::ZERO, Decimal::ONE, day, day)
            .expect_err("zero length");
        assert!(matches!(error, ApplicationError::Domain(LifecycleError::Validation(_))));
    }
}

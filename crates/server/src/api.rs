//! JSON API over the space request workflow.
//!
//! - `GET  /api/v1/requests`                    list requests (sweeps first)
//! - `POST /api/v1/requests`                    submit a draft
//! - `GET  /api/v1/requests/{id}`               fetch one request (sweeps first)
//! - `POST /api/v1/requests/{id}/approve`       approve at the current chain position
//! - `POST /api/v1/requests/{id}/reject`        reject at the current chain position
//! - `POST /api/v1/requests/{id}/vacate`        requester marks an expired lease vacated
//! - `POST /api/v1/requests/{id}/inspect`       record an inspection result
//! - `GET  /api/v1/requests/{id}/renewal`       renewal draft for `?actor_id=`
//! - `POST /api/v1/estimate`                    live price for prospective dimensions and dates
//! - `POST /api/v1/sweep`                       run the expiry sweep now
//! - `GET  /api/v1/users/{id}/notifications`    in-app notification feed
//! - `POST /api/v1/users/{id}/notifications/read` mark the feed as read

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tsm_core::billing::RateQuote;
use tsm_core::domain::notification::{InMemoryNotificationSink, Notification};
use tsm_core::domain::request::{RequestId, SpaceRequest, SpaceRequestDraft};
use tsm_core::domain::role::UserId;
use tsm_core::errors::{ApplicationError, InterfaceError};
use tsm_core::lifecycle::{InspectionResult, LifecycleCommand, TransitionOutcome};

use crate::workflow::WorkflowService;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    workflow: Arc<WorkflowService>,
    inbox: InMemoryNotificationSink,
}

impl ApiState {
    pub fn new(workflow: Arc<WorkflowService>, inbox: InMemoryNotificationSink) -> Self {
        Self { workflow, inbox }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub actor_id: String,
    pub draft: SpaceRequestDraft,
    pub annotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub actor_id: String,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct InspectionBody {
    pub actor_id: String,
    pub result: InspectionResult,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: String,
}

#[derive(Debug, Deserialize)]
pub struct EstimateBody {
    pub length: Decimal,
    pub width: Decimal,
    pub date_in: NaiveDate,
    pub date_out: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired: Vec<RequestId>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

/// Interface-tier error rendered as a JSON body with a stable status mapping.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn from_application(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.user_message(),
            detail: self.0.message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/requests", get(list_requests).post(submit_request))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/approve", post(approve_request))
        .route("/api/v1/requests/{id}/reject", post(reject_request))
        .route("/api/v1/requests/{id}/vacate", post(vacate_request))
        .route("/api/v1/requests/{id}/inspect", post(inspect_request))
        .route("/api/v1/requests/{id}/renewal", get(renewal_draft))
        .route("/api/v1/estimate", post(estimate))
        .route("/api/v1/sweep", post(run_sweep))
        .route("/api/v1/users/{id}/notifications", get(user_notifications))
        .route("/api/v1/users/{id}/notifications/read", post(mark_notifications_read))
        .with_state(state)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

async fn list_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Vec<SpaceRequest>> {
    let correlation_id = correlation_id(&headers);
    state
        .workflow
        .list_requests(&correlation_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn get_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<SpaceRequest> {
    let correlation_id = correlation_id(&headers);
    state
        .workflow
        .get_request(&RequestId(id), &correlation_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn submit_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SubmitRequestBody>,
) -> Result<(StatusCode, Json<SpaceRequest>), ApiError> {
    let correlation_id = correlation_id(&headers);
    state
        .workflow
        .submit(&UserId(body.actor_id), body.draft, body.annotation, &correlation_id)
        .await
        .map(|request| (StatusCode::CREATED, Json(request)))
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn transition(
    state: &ApiState,
    headers: &HeaderMap,
    id: String,
    actor_id: String,
    command: LifecycleCommand,
) -> ApiResult<TransitionOutcome> {
    let correlation_id = correlation_id(headers);
    state
        .workflow
        .transition(&RequestId(id), &UserId(actor_id), command, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn approve_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<DecisionBody>,
) -> ApiResult<TransitionOutcome> {
    let command = LifecycleCommand::Approve { comment: body.comment };
    transition(&state, &headers, id, body.actor_id, command).await
}

async fn reject_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<DecisionBody>,
) -> ApiResult<TransitionOutcome> {
    let command = LifecycleCommand::Reject { comment: body.comment };
    transition(&state, &headers, id, body.actor_id, command).await
}

async fn vacate_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ActorBody>,
) -> ApiResult<TransitionOutcome> {
    transition(&state, &headers, id, body.actor_id, LifecycleCommand::Vacate).await
}

async fn inspect_request(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<InspectionBody>,
) -> ApiResult<TransitionOutcome> {
    let command = LifecycleCommand::Inspect { result: body.result, comment: body.comment };
    transition(&state, &headers, id, body.actor_id, command).await
}

async fn renewal_draft(
    Path(id): Path<String>,
    Query(query): Query<ActorQuery>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<SpaceRequestDraft> {
    let correlation_id = correlation_id(&headers);
    state
        .workflow
        .renewal_draft(&RequestId(id), &UserId(query.actor_id), &correlation_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn estimate(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<EstimateBody>,
) -> ApiResult<RateQuote> {
    let correlation_id = correlation_id(&headers);
    state
        .workflow
        .estimate(body.length, body.width, body.date_in, body.date_out)
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn run_sweep(State(state): State<ApiState>, headers: HeaderMap) -> ApiResult<SweepResponse> {
    let correlation_id = correlation_id(&headers);
    state
        .workflow
        .sweep(&correlation_id)
        .await
        .map(|expired| Json(SweepResponse { expired }))
        .map_err(|error| ApiError::from_application(error, &correlation_id))
}

async fn user_notifications(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Vec<Notification>> {
    let correlation_id = correlation_id(&headers);
    let user_id = UserId(id);
    state
        .workflow
        .resolve_actor(&user_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(state.inbox.for_user(&user_id)))
}

async fn mark_notifications_read(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<MarkReadResponse> {
    let correlation_id = correlation_id(&headers);
    let user_id = UserId(id);
    state
        .workflow
        .resolve_actor(&user_id)
        .await
        .map_err(|error| ApiError::from_application(error, &correlation_id))?;
    Ok(Json(MarkReadResponse { marked: state.inbox.mark_read(&user_id) }))
}

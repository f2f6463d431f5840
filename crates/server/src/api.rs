//! JSON API over the approval workflow.
//!
//! Endpoints:
//! - `POST /api/v1/requests`                                  — submit a request
//! - `GET  /api/v1/requests?role=&user=`                      — role-scoped listing
//! - `GET  /api/v1/requests/{id}`                             — fetch one request
//! - `GET  /api/v1/requests/{id}/audit`                       — audit trail
//! - `POST /api/v1/requests/{id}/manager-decision`            — first-stage decision
//! - `POST /api/v1/requests/{id}/project-manager-decision`    — second-stage decision

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use wardstock_core::audit::AuditEvent;
use wardstock_core::domain::request::{Request, RequestId};
use wardstock_core::domain::role::Role;
use wardstock_core::errors::InterfaceError;
use wardstock_core::views::scope_for;
use wardstock_core::workflow::{self, Decision, DecisionStage, SubmitInput};
use wardstock_db::repositories::RequestRepository;

#[derive(Clone)]
pub struct ApiState {
    repository: Arc<dyn RequestRepository>,
}

pub fn router(repository: Arc<dyn RequestRepository>) -> Router {
    Router::new()
        .route("/api/v1/requests", post(submit_request).get(list_requests))
        .route("/api/v1/requests/{id}", get(get_request))
        .route("/api/v1/requests/{id}/audit", get(get_audit_trail))
        .route("/api/v1/requests/{id}/manager-decision", post(manager_decision))
        .route("/api/v1/requests/{id}/project-manager-decision", post(project_manager_decision))
        .with_state(ApiState { repository })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub requested_by: String,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    pub approve: bool,
    pub actor: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub role: String,
    #[serde(default)]
    pub user: String,
}

/// Wire shape of a request: the stored fields plus the derived
/// `status`, `stage`, and `total_value`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestView {
    pub id: String,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_value: Decimal,
    pub status: String,
    pub stage: String,
    pub requested_by: String,
    pub manager_approved: bool,
    pub manager_approved_by: Option<String>,
    pub manager_approved_at: Option<DateTime<Utc>>,
    pub project_manager_approved: bool,
    pub project_manager_approved_by: Option<String>,
    pub project_manager_approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Request> for RequestView {
    fn from(request: Request) -> Self {
        Self {
            total_value: request.total_value(),
            status: request.status().as_str().to_string(),
            stage: request.stage().as_str().to_string(),
            id: request.id.0,
            item_name: request.item_name,
            quantity: request.quantity,
            unit_price: request.unit_price,
            requested_by: request.requested_by,
            manager_approved: request.manager_approved,
            manager_approved_by: request.manager_approved_by,
            manager_approved_at: request.manager_approved_at,
            project_manager_approved: request.project_manager_approved,
            project_manager_approved_by: request.project_manager_approved_by,
            project_manager_approved_at: request.project_manager_approved_at,
            rejected_by: request.rejected_by,
            rejected_at: request.rejected_at,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
    /// Present on conflicts so clients can refresh without a second fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<RequestView>,
}

pub struct ApiError {
    status: StatusCode,
    body: ApiErrorBody,
}

impl ApiError {
    fn from_interface(error: InterfaceError, current: Option<RequestView>) -> Self {
        let status = match &error {
            InterfaceError::BadRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let correlation_id = match &error {
            InterfaceError::BadRequest { correlation_id, .. }
            | InterfaceError::NotFound { correlation_id, .. }
            | InterfaceError::Conflict { correlation_id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id, .. }
            | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
        };

        warn!(
            event_name = "api.request.error",
            correlation_id = %correlation_id,
            status = %status,
            detail = %error,
            "request failed"
        );

        Self {
            status,
            body: ApiErrorBody {
                error: error.user_message().to_string(),
                detail: error.to_string(),
                correlation_id,
                current,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn submit_request(
    State(state): State<ApiState>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let request = workflow::submit(SubmitInput {
        item_name: body.item_name,
        quantity: body.quantity,
        unit_price: body.unit_price,
        requested_by: body.requested_by,
    })
    .map_err(|error| {
        ApiError::from_interface(
            wardstock_core::errors::ApplicationError::from(error).into_interface(&correlation_id),
            None,
        )
    })?;

    state.repository.create(request.clone()).await.map_err(|error| {
        ApiError::from_interface(error.into_application().into_interface(&correlation_id), None)
    })?;

    info!(
        event_name = "api.request.submitted",
        correlation_id = %correlation_id,
        request_id = %request.id,
        requested_by = %request.requested_by,
        "request submitted"
    );

    Ok((StatusCode::CREATED, Json(RequestView::from(request))))
}

async fn list_requests(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let role = Role::from_str(&query.role).map_err(|error| {
        ApiError::from_interface(
            wardstock_core::errors::ApplicationError::from(error).into_interface(&correlation_id),
            None,
        )
    })?;

    let filter = scope_for(role, query.user.trim());
    // A submitter-scoped role without a user would match nothing; refuse it
    // instead of answering with a silently empty list.
    if filter.requested_by.as_deref() == Some("") {
        return Err(ApiError::from_interface(
            wardstock_core::errors::ApplicationError::from(
                wardstock_core::errors::DomainError::Validation(format!(
                    "role `{}` requires a `user` query parameter",
                    query.role
                )),
            )
            .into_interface(&correlation_id),
            None,
        ));
    }
    let requests = state.repository.list(&filter).await.map_err(|error| {
        ApiError::from_interface(error.into_application().into_interface(&correlation_id), None)
    })?;

    Ok(Json(requests.into_iter().map(RequestView::from).collect()))
}

async fn get_request(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<RequestView>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let request_id = RequestId(id);

    let request = find_or_not_found(&state, &request_id, &correlation_id).await?;
    Ok(Json(RequestView::from(request)))
}

async fn get_audit_trail(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let request_id = RequestId(id);

    find_or_not_found(&state, &request_id, &correlation_id).await?;
    let trail = state.repository.audit_trail(&request_id).await.map_err(|error| {
        ApiError::from_interface(error.into_application().into_interface(&correlation_id), None)
    })?;

    Ok(Json(trail))
}

async fn manager_decision(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<RequestView>, ApiError> {
    decide(state, id, DecisionStage::Manager, body).await
}

async fn project_manager_decision(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<RequestView>, ApiError> {
    decide(state, id, DecisionStage::ProjectManager, body).await
}

async fn decide(
    state: ApiState,
    id: String,
    stage: DecisionStage,
    body: DecisionBody,
) -> Result<Json<RequestView>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let request_id = RequestId(id);
    let decision = Decision::new(stage, body.approve, body.actor);

    match state.repository.apply_decision(&request_id, &decision).await {
        Ok(updated) => {
            info!(
                event_name = "api.request.decided",
                correlation_id = %correlation_id,
                request_id = %request_id,
                stage = stage.as_str(),
                approve = body.approve,
                actor = %decision.actor,
                "decision applied"
            );
            Ok(Json(RequestView::from(updated)))
        }
        Err(error) => {
            let interface = error.into_application().into_interface(&correlation_id);
            // A conflict response carries the request's current state so the
            // caller can refresh in one round trip.
            let current = if matches!(interface, InterfaceError::Conflict { .. }) {
                state
                    .repository
                    .find_by_id(&request_id)
                    .await
                    .ok()
                    .flatten()
                    .map(RequestView::from)
            } else {
                None
            };
            Err(ApiError::from_interface(interface, current))
        }
    }
}

async fn find_or_not_found(
    state: &ApiState,
    request_id: &RequestId,
    correlation_id: &str,
) -> Result<Request, ApiError> {
    state
        .repository
        .find_by_id(request_id)
        .await
        .map_err(|error| {
            ApiError::from_interface(error.into_application().into_interface(correlation_id), None)
        })?
        .ok_or_else(|| {
            ApiError::from_interface(
                wardstock_core::errors::ApplicationError::NotFound(request_id.to_string())
                    .into_interface(correlation_id),
                None,
            )
        })
}

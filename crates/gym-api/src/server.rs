//! Axum server and routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use gym_types::{
    AssignRequest, AssignmentListResponse, AssignmentStatus, AuditListOptions, AuditListResponse,
    BaseResponse, LifecycleError, MembershipLifecycle, RemoveRequest, StatusChangeRequest,
    TransitionResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub struct AppState {
    pub lifecycle: Arc<dyn MembershipLifecycle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/members/:member_id/assignments",
            post(handle_assign).get(handle_list_assignments),
        )
        .route(
            "/members/:member_id/assignments/:assignment_id",
            axum::routing::delete(handle_remove),
        )
        .route(
            "/members/:member_id/assignments/:assignment_id/status",
            post(handle_update_status),
        )
        .route("/members/:member_id/audit", get(handle_audit_list))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP status for a lifecycle error; the envelope `code` carries the same value.
pub fn status_for(err: &LifecycleError) -> StatusCode {
    match err {
        LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
        LifecycleError::PlanNotFound(_)
        | LifecycleError::AssignmentNotFound(_)
        | LifecycleError::MemberNotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        LifecycleError::Persistence(_) | LifecycleError::Audit(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn respond<T: Serialize>(
    result: Result<T, LifecycleError>,
) -> (StatusCode, Json<BaseResponse<T>>) {
    match result {
        Ok(data) => (StatusCode::OK, Json(BaseResponse::ok(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "lifecycle call failed");
            } else {
                tracing::debug!(error = %e, "lifecycle call rejected");
            }
            (
                status,
                Json(BaseResponse::error(status.as_u16() as i32, e.to_string())),
            )
        }
    }
}

/// Body of `POST /members/:member_id/assignments`; the member comes from the path.
#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub plan_id: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub price_paid: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

async fn handle_assign(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<String>,
    Json(body): Json<AssignBody>,
) -> (StatusCode, Json<TransitionResponse>) {
    let req = AssignRequest {
        member_id,
        plan_id: body.plan_id,
        start_date: body.start_date,
        end_date: body.end_date,
        price_paid: body.price_paid,
        notes: body.notes,
        request_id: body.request_id,
    };
    respond(state.lifecycle.assign(&req).await)
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: AssignmentStatus,
    #[serde(default)]
    pub request_id: Option<String>,
}

async fn handle_update_status(
    State(state): State<Arc<AppState>>,
    Path((member_id, assignment_id)): Path<(String, String)>,
    Json(body): Json<StatusBody>,
) -> (StatusCode, Json<TransitionResponse>) {
    let req = StatusChangeRequest {
        assignment_id,
        member_id,
        new_status: body.status,
        request_id: body.request_id,
    };
    respond(state.lifecycle.update_status(&req).await)
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

async fn handle_remove(
    State(state): State<Arc<AppState>>,
    Path((member_id, assignment_id)): Path<(String, String)>,
    Query(q): Query<RemoveQuery>,
) -> (StatusCode, Json<TransitionResponse>) {
    let req = RemoveRequest {
        member_id,
        assignment_id,
        plan_id: q.plan_id.unwrap_or_default(),
        request_id: q.request_id,
    };
    respond(state.lifecycle.remove(&req).await)
}

async fn handle_list_assignments(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<String>,
) -> (StatusCode, Json<AssignmentListResponse>) {
    respond(state.lifecycle.list_for_member(&member_id).await)
}

#[derive(Debug, Deserialize)]
pub struct AuditListQuery {
    /// RFC 3339 instant. Use the `Z` suffix (`2024-03-01T00:00:00Z`) or percent-encode a `+`
    /// offset as `%2B`; a bare `+` in a query string decodes to a space and is rejected.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

async fn handle_audit_list(
    State(state): State<Arc<AppState>>,
    Path(member_id): Path<String>,
    Query(q): Query<AuditListQuery>,
) -> (StatusCode, Json<AuditListResponse>) {
    let opts = AuditListOptions {
        member_id: None,
        since: q.since,
        limit: q.limit,
        offset: q.offset,
    };
    respond(state.lifecycle.get_log(&member_id, &opts).await)
}

async fn handle_health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use gym_types::AuditLogError;

    #[test]
    fn error_statuses() {
        let cases = [
            (LifecycleError::Validation("x".into()), 400),
            (LifecycleError::PlanNotFound("p".into()), 404),
            (LifecycleError::AssignmentNotFound("a".into()), 404),
            (LifecycleError::MemberNotFound("m".into()), 404),
            (LifecycleError::ConcurrencyConflict("c".into()), 409),
            (LifecycleError::Persistence("db".into()), 500),
            (
                LifecycleError::Audit(AuditLogError::Other("io".into())),
                500,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(status_for(&err).as_u16(), code, "{}", err);
        }
    }

    #[test]
    fn assign_body_defaults_price() {
        let body: AssignBody =
            serde_json::from_str(r#"{"plan_id":"basic","start_date":"2024-01-10"}"#).unwrap();
        assert_eq!(body.price_paid, 0.0);
        assert!(body.end_date.is_none());
    }
}

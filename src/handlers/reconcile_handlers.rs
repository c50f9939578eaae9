//! Operator endpoints: trigger a sweep, read the audit trail.

use crate::{
    app::AppState,
    errors::{AppError, BucketError},
    handlers::project_handlers::actor_from_headers,
};
use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

/// `POST /reconcile`
///
/// Runs one sweep inline and returns its report. Meant for an external
/// scheduler; the sweep itself never fails on a single bad record.
pub async fn run_reconcile(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state
        .reconciler
        .reconcile()
        .await
        .map_err(BucketError::from)?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize, Default)]
pub struct AuditQuery {
    pub resource_name: Option<String>,
    pub project_name: Option<String>,
}

/// `GET /audit`, admins only.
pub async fn audit_log(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = actor_from_headers(&headers);
    state.buckets.require_admin(actor.as_ref()).await?;

    let records = state
        .buckets
        .audit(query.resource_name.as_deref(), query.project_name.as_deref())
        .await?;
    Ok(Json(json!({ "count": records.len(), "records": records })))
}

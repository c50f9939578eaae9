//! HTTP handlers for project buckets.
//!
//! Identity arrives from the gateway in `x-actor-id` / `x-actor-email`
//! headers; a request without them is unauthenticated.

use crate::{
    app::AppState,
    errors::{AppError, BucketError},
    models::{
        actor::Actor,
        bucket::DesiredConfig,
        lifecycle_rules::{LifecycleConfiguration, LifecyclePolicy},
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_EMAIL_HEADER: &str = "x-actor-email";

/// Caller identity from gateway headers, if any.
pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header(ACTOR_ID_HEADER).map(|id| Actor::new(id, header(ACTOR_EMAIL_HEADER)))
}

/// Request body for `POST /projects`.
#[derive(Debug, Deserialize)]
pub struct CreateProjectReq {
    pub project_name: Option<String>,
    /// `Enabled` (default) or `Disabled`; anything else counts as enabled.
    pub versioning: Option<String>,
    pub lifecycle_policy: Option<String>,
    pub custom_lifecycle_config: Option<serde_json::Value>,
}

impl CreateProjectReq {
    fn desired_config(&self) -> Result<DesiredConfig, BucketError> {
        let custom_lifecycle_rules = self
            .custom_lifecycle_config
            .clone()
            .filter(|value| !value.is_null())
            .map(serde_json::from_value::<LifecycleConfiguration>)
            .transpose()
            .map_err(|err| {
                BucketError::Validation(format!("custom_lifecycle_config is malformed: {err}"))
            })?;

        Ok(DesiredConfig {
            versioning_enabled: self.versioning.as_deref() != Some("Disabled"),
            lifecycle_policy: self
                .lifecycle_policy
                .as_deref()
                .map(LifecyclePolicy::parse_lenient)
                .unwrap_or_default(),
            custom_lifecycle_rules,
        })
    }
}

/// Optional owner disambiguation for admins.
#[derive(Debug, Deserialize, Default)]
pub struct OwnerQuery {
    pub owner_id: Option<String>,
}

/// Listing filters; `project_name` narrows the listing to one record.
#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub project_name: Option<String>,
    pub owner_id: Option<String>,
}

/// `POST /projects`
pub async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateProjectReq>,
) -> Result<impl IntoResponse, AppError> {
    let actor = actor_from_headers(&headers);
    let project_name = req
        .project_name
        .as_deref()
        .ok_or_else(|| BucketError::Validation("project_name is required".into()))?;
    let desired = req.desired_config()?;

    let outcome = state
        .buckets
        .create(actor.as_ref(), project_name, desired)
        .await?;

    let record = &outcome.record;
    let warnings: Vec<String> = outcome.warnings.iter().map(ToString::to_string).collect();
    let versioning = if record.config.versioning_enabled {
        "Enabled"
    } else {
        "Disabled"
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Bucket created successfully",
            "bucket_name": record.resource_name,
            "project_name": record.display_name,
            "versioning": versioning,
            "lifecycle_policy": record.config.lifecycle_policy,
            "warnings": warnings,
        })),
    ))
}

/// `GET /projects`
pub async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = actor_from_headers(&headers);

    if let Some(project_name) = query.project_name.as_deref() {
        let record = state
            .buckets
            .get(actor.as_ref(), project_name, query.owner_id.as_deref())
            .await?;
        return Ok(Json(json!({ "buckets": [record], "count": 1 })));
    }

    let records = state.buckets.list(actor.as_ref()).await?;
    Ok(Json(json!({ "count": records.len(), "buckets": records })))
}

/// `GET /projects/{project}`
pub async fn get_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = actor_from_headers(&headers);
    let record = state
        .buckets
        .get(actor.as_ref(), &project, query.owner_id.as_deref())
        .await?;
    Ok(Json(record))
}

/// `DELETE /projects/{project}`
pub async fn delete_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<impl IntoResponse, AppError> {
    let actor = actor_from_headers(&headers);
    let outcome = state
        .buckets
        .delete(actor.as_ref(), &project, query.owner_id.as_deref())
        .await?;

    Ok(Json(json!({
        "message": "Bucket deleted successfully",
        "bucket_name": outcome.record.resource_name,
        "project_name": outcome.record.display_name,
        "should_heal": outcome.should_heal,
    })))
}

//! Defines routes for project buckets and operator endpoints.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Projects**
//!   - `POST   /projects`: provision a bucket for a project
//!   - `GET    /projects`: list (own, or all for admins); `?project_name=` narrows to one
//!   - `GET    /projects/{project}`: one record (`?owner_id=` for admins)
//!   - `DELETE /projects/{project}`: delete (`?owner_id=` for admins)
//!
//! - **Operations**
//!   - `POST   /reconcile`: run one reconciliation sweep
//!   - `GET    /audit`: deletion and heal history (`?resource_name=` or `?project_name=`)

use crate::{
    app::AppState,
    handlers::{
        health_handlers::{healthz, readyz},
        project_handlers::{create_project, delete_project, get_project, list_projects},
        reconcile_handlers::{audit_log, run_reconcile},
    },
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router. The shared `AppState` is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/{project}", get(get_project).delete(delete_project))
        .route("/reconcile", post(run_reconcile))
        .route("/audit", get(audit_log))
}

//! Maintenance routes.

use axum::{extract::State, Json};

use kbase_db::ReconcileReport;

use crate::services::run_cleanup;
use crate::{ApiError, AppState};

/// Run attachment reconciliation now and return what it cleaned.
pub async fn run_cleanup_now(
    State(state): State<AppState>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let reconciler = state.storage()?.reconciler();
    let report = run_cleanup(&reconciler, &state.audit).await;
    Ok(Json(report))
}

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storesync_db::SyncRunRow;
use storesync_engine::SyncReport;
use uuid::Uuid;

use crate::middleware::{RequestId, TenantIdentity};
use crate::runner::{run_tenant_sync, RunFailure};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SyncRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncTriggerData {
    run_id: Uuid,
    status: &'static str,
    report: SyncReport,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    run_id: Uuid,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    products_processed: i32,
    items_created: i32,
    items_updated: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SyncRunRow> for SyncRunItem {
    fn from(row: SyncRunRow) -> Self {
        Self {
            run_id: row.public_id,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            products_processed: row.products_processed,
            items_created: row.items_created,
            items_updated: row.items_updated,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

pub(super) async fn trigger_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantIdentity>,
) -> Result<Json<ApiResponse<SyncTriggerData>>, ApiError> {
    tracing::info!(tenant = %tenant.slug, "catalog sync requested");

    let outcome = run_tenant_sync(&state.pool, &state.config, tenant.tenant_id, "api")
        .await
        .map_err(|failure| map_run_failure(req_id.0.clone(), &tenant.slug, &failure))?;

    Ok(Json(ApiResponse {
        data: SyncTriggerData {
            run_id: outcome.run.public_id,
            status: "succeeded",
            report: outcome.report,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_sync_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantIdentity>,
    Query(query): Query<SyncRunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    let rows = storesync_db::list_sync_runs_for_tenant(
        &state.pool,
        tenant.tenant_id,
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(SyncRunItem::from).collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_sync_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantIdentity>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<SyncRunItem>>, ApiError> {
    let row = storesync_db::get_sync_run_by_public_id(&state.pool, tenant.tenant_id, run_id)
        .await
        .map_err(|e| match e {
            storesync_db::DbError::NotFound => {
                ApiError::new(req_id.0.clone(), "not_found", "sync run not found")
            }
            other => map_db_error(req_id.0.clone(), &other),
        })?;

    Ok(Json(ApiResponse {
        data: SyncRunItem::from(row),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// Translate a [`RunFailure`] into the error envelope. Infrastructure
/// failures get a generic body; domain outcomes carry their own message.
fn map_run_failure(request_id: String, tenant_slug: &str, failure: &RunFailure) -> ApiError {
    tracing::error!(tenant = %tenant_slug, error = %failure, "catalog sync failed");

    let code = match failure {
        RunFailure::TenantNotConfigured => "tenant_not_configured",
        RunFailure::SyncInProgress => "sync_in_progress",
        RunFailure::TimedOut { .. } => "sync_timeout",
        RunFailure::TenantUnreachable(_) | RunFailure::Engine(_) | RunFailure::Control(_) => {
            "internal_error"
        }
    };

    let message = if code == "internal_error" {
        "catalog sync failed".to_string()
    } else {
        failure.to_string()
    };

    ApiError::new(request_id, code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_run_item_is_serializable() {
        let item = SyncRunItem {
            run_id: Uuid::new_v4(),
            trigger_source: "api".to_string(),
            status: "succeeded".to_string(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            products_processed: 42,
            items_created: 7,
            items_updated: 35,
            error_message: None,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&item).expect("serialize sync run");
        assert!(json.contains("\"trigger_source\":\"api\""));
        assert!(json.contains("\"products_processed\":42"));
    }

    #[test]
    fn run_failures_map_to_domain_codes() {
        let cases: [(RunFailure, &str); 3] = [
            (RunFailure::TenantNotConfigured, "tenant_not_configured"),
            (RunFailure::SyncInProgress, "sync_in_progress"),
            (RunFailure::TimedOut { ceiling_secs: 60 }, "sync_timeout"),
        ];
        for (failure, code) in cases {
            let error = map_run_failure("req-1".to_string(), "acme", &failure);
            assert_eq!(error.error.code, code);
            assert!(!error.error.message.is_empty());
        }
    }

    #[test]
    fn infrastructure_failures_hide_details() {
        let failure = RunFailure::Control(storesync_db::DbError::NotFound);
        let error = map_run_failure("req-1".to_string(), "acme", &failure);
        assert_eq!(error.error.code, "internal_error");
        assert_eq!(error.error.message, "catalog sync failed");
    }
}

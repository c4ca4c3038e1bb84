mod images;
mod orders;
mod sync;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use storesync_core::AppConfig;
use storesync_engine::ListingClient;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_api_key, AuthState, RateLimitState, RequestId,
    API_KEY_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" | "sync_in_progress" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &storesync_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_tenant_db_error(request_id: String, error: &sqlx::Error) -> ApiError {
    tracing::error!(error = %error, "tenant database query failed");
    ApiError::new(request_id, "internal_error", "tenant database query failed")
}

/// Open a per-request pool to the tenant's target database.
///
/// Callers drop connections before closing the pool; handlers that return
/// early on error leave the close to the pool's own drop path.
pub(super) async fn tenant_pool(
    state: &AppState,
    tenant_id: i64,
    request_id: &str,
) -> Result<PgPool, ApiError> {
    let connection = storesync_db::get_tenant_connection(&state.pool, tenant_id)
        .await
        .map_err(|e| map_db_error(request_id.to_string(), &e))?
        .ok_or_else(|| {
            ApiError::new(
                request_id,
                "tenant_not_configured",
                "tenant database connection is not configured",
            )
        })?;

    storesync_db::connect_tenant_pool(
        &connection,
        state.config.tenant_db_max_connections,
        state.config.tenant_db_connect_timeout_secs,
    )
    .await
    .map_err(|e| {
        tracing::error!(tenant_id, error = %e, "tenant database unreachable");
        ApiError::new(request_id, "internal_error", "tenant database unreachable")
    })
}

/// Build a client for the media-listing service, if one is configured.
pub(super) fn listing_client(
    state: &AppState,
    request_id: &str,
) -> Result<ListingClient, ApiError> {
    let base_url = state.config.listing_base_url.as_deref().ok_or_else(|| {
        ApiError::new(
            request_id,
            "bad_request",
            "LISTING_BASE_URL is not configured",
        )
    })?;

    ListingClient::new(base_url, state.config.listing_timeout_secs).map_err(|e| {
        tracing::error!(error = %e, "failed to build listing client");
        ApiError::new(request_id, "internal_error", "failed to build listing client")
    })
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static(API_KEY_HEADER),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/sync/products", post(sync::trigger_sync))
        .route("/api/v1/sync/runs", get(sync::list_sync_runs))
        .route("/api/v1/sync/runs/{run_id}", get(sync::get_sync_run))
        .route("/api/v1/images", get(images::list_listing_files))
        .route("/api/v1/images/sku-matches", get(images::list_sku_matches))
        .route("/api/v1/images/attach", post(images::attach_images))
        .route("/api/v1/orders/report", get(orders::orders_report))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(auth, require_api_key)),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match storesync_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Header carrying the tenant API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The tenant resolved from the presented API key, stored as a request
/// extension by [`require_api_key`] for handlers behind the auth layer.
#[derive(Debug, Clone)]
pub struct TenantIdentity {
    pub tenant_id: i64,
    pub slug: String,
}

/// State for API-key auth: the control-plane pool and the hash salt.
#[derive(Clone)]
pub struct AuthState {
    pub pool: PgPool,
    salt: Arc<String>,
}

impl AuthState {
    #[must_use]
    pub fn new(pool: PgPool, salt: &str) -> Self {
        Self {
            pool,
            salt: Arc::new(salt.to_string()),
        }
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("salt", &"[redacted]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Sliding fixed-window limiter for simple API protection.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware resolving the `X-API-Key` header to a tenant.
///
/// The key is hashed and matched against the control-plane `tenants` table;
/// a hit stores [`TenantIdentity`] in request extensions for handlers,
/// a miss answers 401 without touching the inner route.
pub async fn require_api_key(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(key) = extract_api_key(req.headers().get(API_KEY_HEADER)).map(ToOwned::to_owned)
    else {
        return unauthorized();
    };

    match storesync_db::resolve_tenant_by_api_key(&auth.pool, &auth.salt, &key).await {
        Ok(Some(tenant)) => {
            req.extensions_mut().insert(TenantIdentity {
                tenant_id: tenant.id,
                slug: tenant.slug,
            });
            next.run(req).await
        }
        Ok(None) => unauthorized(),
        Err(e) => {
            tracing::error!(error = %e, "tenant lookup for api key failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(MiddlewareErrorBody {
                    error: MiddlewareError {
                        code: "internal_error",
                        message: "tenant lookup failed",
                    },
                }),
            )
                .into_response()
        }
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(MiddlewareErrorBody {
                error: MiddlewareError {
                    code: "rate_limited",
                    message: "rate limit exceeded",
                },
            }),
        )
            .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MiddlewareErrorBody {
            error: MiddlewareError {
                code: "unauthorized",
                message: "missing or unknown API key",
            },
        }),
    )
        .into_response()
}

fn extract_api_key(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

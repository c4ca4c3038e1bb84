use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use storesync_core::media::{has_attachable_extension, has_image_extension};
use storesync_engine::{
    attach_from_listing, match_listing_skus, AttachOptions, EngineError, ListingAttachReport,
    ListingError, SkuMatch, SyncOptions,
};

use crate::middleware::{RequestId, TenantIdentity};

use super::{
    listing_client, map_tenant_db_error, tenant_pool, ApiError, ApiResponse, AppState, ResponseMeta,
};

/// Directory browsed when the request does not name one.
const DEFAULT_DIRECTORY: &str = "products";

#[derive(Debug, Deserialize)]
pub(super) struct ListingQuery {
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AttachRequest {
    pub directory: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ListingFileItem {
    name: String,
    path: String,
    size: u64,
    is_image: bool,
    attachable: bool,
}

pub(super) async fn list_listing_files(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<ApiResponse<Vec<ListingFileItem>>>, ApiError> {
    let client = listing_client(&state, &req_id.0)?;
    let directory = query
        .directory
        .unwrap_or_else(|| DEFAULT_DIRECTORY.to_string());

    let files = client
        .list_directory(&directory)
        .await
        .map_err(|e| map_listing_error(req_id.0.clone(), &e))?;

    let data = files
        .into_iter()
        .map(|file| ListingFileItem {
            is_image: has_image_extension(&file.name),
            attachable: has_attachable_extension(&file.name),
            name: file.name,
            path: file.path,
            size: file.size,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_sku_matches(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantIdentity>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<ApiResponse<Vec<SkuMatch>>>, ApiError> {
    let client = listing_client(&state, &req_id.0)?;
    let directory = query
        .directory
        .unwrap_or_else(|| DEFAULT_DIRECTORY.to_string());

    let files = client
        .list_directory(&directory)
        .await
        .map_err(|e| map_listing_error(req_id.0.clone(), &e))?;

    let pool = tenant_pool(&state, tenant.tenant_id, &req_id.0).await?;
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| map_tenant_db_error(req_id.0.clone(), &e))?;
    let matches = match_listing_skus(&mut conn, &files)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    drop(conn);
    pool.close().await;

    Ok(Json(ApiResponse {
        data: matches,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn attach_images(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(tenant): Extension<TenantIdentity>,
    Json(body): Json<AttachRequest>,
) -> Result<Json<ApiResponse<ListingAttachReport>>, ApiError> {
    let client = listing_client(&state, &req_id.0)?;
    let sync_options = SyncOptions::from_app_config(&state.config);
    let options = AttachOptions {
        directory: body
            .directory
            .unwrap_or_else(|| DEFAULT_DIRECTORY.to_string()),
        dry_run: body.dry_run,
        author_id: sync_options.author_id,
        media_base_url: sync_options.media_base_url,
    };

    tracing::info!(
        tenant = %tenant.slug,
        directory = %options.directory,
        dry_run = options.dry_run,
        "listing attach requested"
    );

    let pool = tenant_pool(&state, tenant.tenant_id, &req_id.0).await?;
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| map_tenant_db_error(req_id.0.clone(), &e))?;
    let report = attach_from_listing(&mut conn, &client, &options)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;
    drop(conn);
    pool.close().await;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn map_listing_error(request_id: String, error: &ListingError) -> ApiError {
    if matches!(error, ListingError::NotFound { .. }) {
        return ApiError::new(request_id, "not_found", "listing directory not found");
    }
    tracing::error!(error = %error, "listing service request failed");
    ApiError::new(request_id, "internal_error", "listing service request failed")
}

fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    match error {
        EngineError::Listing(e) => map_listing_error(request_id, e),
        other => {
            tracing::error!(error = %other, "listing attach failed");
            ApiError::new(request_id, "internal_error", "listing attach failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_file_item_flags_attachable_images() {
        let item = ListingFileItem {
            name: "widget.jpg".to_string(),
            path: "products/widget.jpg".to_string(),
            size: 2048,
            is_image: has_image_extension("widget.jpg"),
            attachable: has_attachable_extension("widget.jpg"),
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(json.contains("\"is_image\":true"));
        assert!(json.contains("\"attachable\":true"));

        let svg = ListingFileItem {
            name: "logo.svg".to_string(),
            path: "products/logo.svg".to_string(),
            size: 512,
            is_image: has_image_extension("logo.svg"),
            attachable: has_attachable_extension("logo.svg"),
        };
        let json = serde_json::to_string(&svg).expect("serialize");
        assert!(json.contains("\"is_image\":true"));
        assert!(json.contains("\"attachable\":false"));
    }

    #[test]
    fn attach_request_defaults_dry_run_off() {
        let req: AttachRequest =
            serde_json::from_str(r#"{"directory":"products"}"#).expect("parse");
        assert_eq!(req.directory.as_deref(), Some("products"));
        assert!(!req.dry_run);

        let req: AttachRequest = serde_json::from_str(r#"{"dry_run":true}"#).expect("parse");
        assert!(req.directory.is_none());
        assert!(req.dry_run);
    }

    #[test]
    fn listing_not_found_maps_to_not_found() {
        let error = ListingError::NotFound {
            url: "https://media.acme.test/api/files?directory=missing".to_string(),
        };
        let mapped = map_listing_error("req-1".to_string(), &error);
        assert_eq!(mapped.error.code, "not_found");
    }
}

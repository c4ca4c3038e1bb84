//! Listing-based attach mode.
//!
//! Decoupled from the synchronization run: an operator points the engine at
//! a directory on the remote media listing, previews which files map to
//! which catalog items, and attaches them. Filenames carry positional
//! suffixes (`sku.jpg`, `sku-1.jpg`), so the SKU candidate is the stem with
//! one trailing index stripped, and the suffix decides featured vs. gallery
//! placement. Unlike the URL mode, the bytes are fetched here and real
//! dimensions go into the attachment metadata.

use std::collections::HashMap;

use image::GenericImageView;
use serde::Serialize;
use sqlx::{Acquire, PgConnection};
use storesync_core::catalog::{keys, slugify};
use storesync_core::media::{
    attachment_slug, file_stem, has_attachable_extension, is_listing_primary, merge_gallery,
    mime_for_file, sku_from_file_stem, AttachmentMetadata,
};
use storesync_db::tenant::attributes::{
    insert_attributes, load_values_for_items, upsert_single_valued, NewAttribute,
};
use storesync_db::tenant::items::{
    find_product_by_sku, find_product_by_sku_ci, find_product_by_slug, insert_attachment,
    load_attachment_ids_by_slug, NewAttachment,
};

use crate::error::EngineError;
use crate::listing::{ListingClient, RemoteFile};

/// Dimensions recorded when the fetched bytes cannot be decoded.
const FALLBACK_DIMENSIONS: (u32, u32) = (800, 800);

/// Options for one attach pass.
#[derive(Debug, Clone)]
pub struct AttachOptions {
    pub directory: String,
    pub dry_run: bool,
    pub author_id: i64,
    pub media_base_url: String,
}

/// One row of the sku-match preview.
#[derive(Debug, Clone, Serialize)]
pub struct SkuMatch {
    pub file: String,
    pub candidate_sku: String,
    pub item_id: Option<i64>,
    pub matched_by: Option<&'static str>,
}

/// A file that was (or, in a dry run, would be) attached.
#[derive(Debug, Clone, Serialize)]
pub struct AttachedImage {
    pub file: String,
    pub sku: String,
    pub item_id: i64,
    /// `None` only in a dry run for a file that does not exist yet.
    pub attachment_id: Option<i64>,
    pub reused: bool,
    pub primary: bool,
}

/// A file the pass left alone, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedImage {
    pub file: String,
    pub reason: String,
}

/// Outcome of one attach pass over a remote directory.
#[derive(Debug, Serialize)]
pub struct ListingAttachReport {
    pub directory: String,
    pub dry_run: bool,
    pub files_seen: usize,
    pub attached: Vec<AttachedImage>,
    pub skipped: Vec<SkippedImage>,
}

/// Resolve which catalog item each attachable listing file belongs to,
/// without writing anything.
///
/// # Errors
///
/// Returns [`EngineError::Db`] if a lookup fails.
pub async fn match_listing_skus(
    conn: &mut PgConnection,
    files: &[RemoteFile],
) -> Result<Vec<SkuMatch>, EngineError> {
    let mut matches = Vec::new();

    for file in files {
        if !has_attachable_extension(&file.name) {
            continue;
        }
        let candidate_sku = sku_from_file_stem(file_stem(&file.name));
        let resolved = resolve_item(&mut *conn, &candidate_sku).await?;

        matches.push(SkuMatch {
            file: file.name.clone(),
            candidate_sku,
            item_id: resolved.map(|(id, _)| id),
            matched_by: resolved.map(|(_, how)| how),
        });
    }

    Ok(matches)
}

/// List a remote directory and attach every file that maps to a catalog
/// item. With `dry_run` set, resolves and reports but writes nothing.
///
/// All database writes happen in one transaction; remote-fetch failures for
/// individual files are soft (skipped and reported), a listing failure or
/// database error aborts the pass.
///
/// # Errors
///
/// - [`EngineError::Listing`] if the directory listing itself fails.
/// - [`EngineError::Db`] if any database operation fails.
pub async fn attach_from_listing(
    conn: &mut PgConnection,
    client: &ListingClient,
    options: &AttachOptions,
) -> Result<ListingAttachReport, EngineError> {
    let files = client.list_directory(&options.directory).await?;

    let mut report = ListingAttachReport {
        directory: options.directory.clone(),
        dry_run: options.dry_run,
        files_seen: files.len(),
        attached: Vec::new(),
        skipped: Vec::new(),
    };

    // Resolution pass: decide what maps where before touching anything.
    let mut plan: Vec<PlanEntry> = Vec::new();
    for file in files {
        if !has_attachable_extension(&file.name) {
            report.skipped.push(SkippedImage {
                file: file.name,
                reason: "unsupported file extension".to_string(),
            });
            continue;
        }

        let stem = file_stem(&file.name).to_string();
        let sku = sku_from_file_stem(&stem);
        let Some((item_id, _)) = resolve_item(&mut *conn, &sku).await? else {
            report.skipped.push(SkippedImage {
                file: file.name,
                reason: format!("no catalog item for sku '{sku}'"),
            });
            continue;
        };

        plan.push(PlanEntry {
            file,
            stem,
            sku,
            item_id,
        });
    }

    let slugs: Vec<String> = plan.iter().map(|p| attachment_slug(&p.file.name)).collect();
    let mut attachment_ids = load_attachment_ids_by_slug(&mut *conn, &slugs).await?;

    if options.dry_run {
        let mut seen_primary: HashMap<i64, bool> = HashMap::new();
        for entry in &plan {
            let existing = attachment_ids.get(&attachment_slug(&entry.file.name)).copied();
            let primary = is_primary(&mut seen_primary, entry);
            report.attached.push(AttachedImage {
                file: entry.file.name.clone(),
                sku: entry.sku.clone(),
                item_id: entry.item_id,
                attachment_id: existing,
                reused: existing.is_some(),
                primary,
            });
        }
        return Ok(report);
    }

    let created_timestamp = chrono::Utc::now().timestamp();
    let mut tx = conn.begin().await?;

    let mut created_attrs: Vec<NewAttribute> = Vec::new();
    let mut thumbnails: HashMap<i64, i64> = HashMap::new();
    let mut galleries: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut seen_primary: HashMap<i64, bool> = HashMap::new();

    for entry in &plan {
        let slug = attachment_slug(&entry.file.name);

        let (attachment_id, reused) = if let Some(existing) = attachment_ids.get(&slug).copied() {
            (existing, true)
        } else {
            let bytes = match client.fetch_file(&entry.file.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(file = %entry.file.name, error = %e, "failed to fetch listing file");
                    report.skipped.push(SkippedImage {
                        file: entry.file.name.clone(),
                        reason: format!("fetch failed: {e}"),
                    });
                    continue;
                }
            };

            let (width, height) = match image::load_from_memory(&bytes) {
                Ok(img) => img.dimensions(),
                Err(e) => {
                    tracing::debug!(file = %entry.file.name, error = %e, "undecodable image; using fallback dimensions");
                    FALLBACK_DIMENSIONS
                }
            };

            let new_id = insert_attachment(
                &mut *tx,
                &NewAttachment {
                    title: entry.stem.clone(),
                    slug: slug.clone(),
                    parent_id: entry.item_id,
                    author_id: options.author_id,
                    media_url: format!("{}/{}", options.media_base_url, entry.file.name),
                    mime_type: mime_for_file(&entry.file.name),
                },
            )
            .await?;

            created_attrs.push(NewAttribute::new(
                new_id,
                keys::ATTACHED_FILE,
                entry.file.name.clone(),
            ));
            created_attrs.push(NewAttribute::new(
                new_id,
                keys::ATTACHMENT_METADATA,
                AttachmentMetadata::new(width, height, &entry.file.name, created_timestamp)
                    .to_json(),
            ));
            attachment_ids.insert(slug, new_id);
            (new_id, false)
        };

        let primary = is_primary(&mut seen_primary, entry);
        if primary {
            thumbnails.entry(entry.item_id).or_insert(attachment_id);
        } else {
            galleries.entry(entry.item_id).or_default().push(attachment_id);
        }

        report.attached.push(AttachedImage {
            file: entry.file.name.clone(),
            sku: entry.sku.clone(),
            item_id: entry.item_id,
            attachment_id: Some(attachment_id),
            reused,
            primary,
        });
    }

    insert_attributes(&mut *tx, &created_attrs).await?;

    let thumbnail_values: Vec<(i64, String)> = thumbnails
        .into_iter()
        .map(|(item_id, attachment_id)| (item_id, attachment_id.to_string()))
        .collect();
    upsert_single_valued(&mut *tx, keys::THUMBNAIL_ID, &thumbnail_values).await?;

    if !galleries.is_empty() {
        let gallery_items: Vec<i64> = galleries.keys().copied().collect();
        let existing = load_values_for_items(&mut *tx, keys::IMAGE_GALLERY, &gallery_items).await?;

        let gallery_values: Vec<(i64, String)> = galleries
            .into_iter()
            .map(|(item_id, new_ids)| {
                let merged = merge_gallery(existing.get(&item_id).map(String::as_str), &new_ids);
                (item_id, merged)
            })
            .collect();
        upsert_single_valued(&mut *tx, keys::IMAGE_GALLERY, &gallery_values).await?;
    }

    tx.commit().await?;
    Ok(report)
}

#[derive(Debug)]
struct PlanEntry {
    file: RemoteFile,
    stem: String,
    sku: String,
    item_id: i64,
}

/// First-wins featured-image decision per item, in plan order.
fn is_primary(seen: &mut HashMap<i64, bool>, entry: &PlanEntry) -> bool {
    if seen.get(&entry.item_id).copied().unwrap_or(false) {
        return false;
    }
    let primary = is_listing_primary(&entry.stem, &entry.sku);
    if primary {
        seen.insert(entry.item_id, true);
    }
    primary
}

/// Three-step item lookup: slug (products are slugged by sku), exact sku
/// attribute, then case-insensitive sku attribute.
async fn resolve_item(
    conn: &mut PgConnection,
    sku: &str,
) -> Result<Option<(i64, &'static str)>, sqlx::Error> {
    if let Some(id) = find_product_by_slug(&mut *conn, &slugify(sku)).await? {
        return Ok(Some((id, "slug")));
    }
    if let Some(id) = find_product_by_sku(&mut *conn, sku).await? {
        return Ok(Some((id, "sku")));
    }
    if let Some(id) = find_product_by_sku_ci(&mut *conn, sku).await? {
        return Ok(Some((id, "sku_ci")));
    }
    Ok(None)
}

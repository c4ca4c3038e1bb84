//! Image phase of a synchronization run (source-row URL mode).
//!
//! Runs after the transactional core commits, in its own per-batch
//! transactions: losing one image batch never rolls back the product sync,
//! and a re-run picks the batch up again via the slug-based reuse check.
//! Image bytes are never fetched here; dimensions use the fixed placeholder
//! and the stored URL points at the upload path with a cache-busting
//! version parameter.

use std::collections::HashMap;

use sqlx::{Acquire, PgConnection};
use storesync_core::catalog::keys;
use storesync_core::media::{
    attachment_slug, file_name_from_url, file_stem, has_image_extension, is_primary_image,
    merge_gallery, mime_for_file, AttachmentMetadata,
};
use storesync_db::tenant::attributes::{
    insert_attributes, load_values_for_items, upsert_single_valued, NewAttribute,
};
use storesync_db::tenant::items::{
    insert_attachment, load_attachment_ids_by_slug, resolve_product_ids_for_skus, NewAttachment,
};
use storesync_db::tenant::source::{fetch_image_page, ImageSourceRow};

use crate::error::EngineError;
use crate::SyncOptions;

#[derive(Debug, Default)]
pub(crate) struct ImagesOutcome {
    pub attachments_created: u64,
    pub attachments_reused: u64,
}

pub(crate) async fn attach_catalog_images(
    conn: &mut PgConnection,
    options: &SyncOptions,
) -> Result<ImagesOutcome, EngineError> {
    let cache_buster = chrono::Utc::now().timestamp();
    let limit = i64::try_from(options.batch_size).unwrap_or(i64::MAX);
    let mut offset = 0i64;
    let mut outcome = ImagesOutcome::default();

    loop {
        let page = fetch_image_page(&mut *conn, limit, offset).await?;
        if page.is_empty() {
            break;
        }
        offset += i64::try_from(page.len()).unwrap_or(0);

        let mut tx = conn.begin().await?;
        attach_image_batch(&mut *tx, options, cache_buster, &page, &mut outcome).await?;
        tx.commit().await?;
    }

    Ok(outcome)
}

async fn attach_image_batch(
    conn: &mut PgConnection,
    options: &SyncOptions,
    cache_buster: i64,
    page: &[ImageSourceRow],
    outcome: &mut ImagesOutcome,
) -> Result<(), EngineError> {
    // Decode image lists up front; a malformed list skips that row only.
    let mut products: Vec<(&str, Vec<String>)> = Vec::with_capacity(page.len());
    for row in page {
        match serde_json::from_str::<Vec<String>>(&row.images) {
            Ok(urls) if !urls.is_empty() => products.push((row.sku.as_str(), urls)),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(sku = %row.sku, error = %e, "unparseable image list; skipping row");
            }
        }
    }
    if products.is_empty() {
        return Ok(());
    }

    let skus: Vec<String> = products.iter().map(|(sku, _)| (*sku).to_string()).collect();
    let item_ids = resolve_product_ids_for_skus(&mut *conn, &skus).await?;

    // Pre-fetch every attachment the batch could reuse in one query.
    let slugs: Vec<String> = products
        .iter()
        .flat_map(|(_, urls)| urls.iter())
        .map(|url| file_name_from_url(url))
        .filter(|file| has_image_extension(file))
        .map(attachment_slug)
        .collect();
    let mut attachment_ids = load_attachment_ids_by_slug(&mut *conn, &slugs).await?;

    let mut attachment_attrs: Vec<NewAttribute> = Vec::new();
    let mut thumbnails: HashMap<i64, i64> = HashMap::new();
    let mut galleries: HashMap<i64, Vec<i64>> = HashMap::new();

    for (sku, urls) in &products {
        let Some(item_id) = item_ids.get(*sku).copied() else {
            tracing::debug!(sku, "no catalog item for staged image row; skipping");
            continue;
        };

        let mut primary: Option<i64> = None;
        let mut gallery_new: Vec<i64> = Vec::new();

        for url in urls {
            let file = file_name_from_url(url);
            if !has_image_extension(file) {
                tracing::debug!(sku, file, "not an image file; skipping entry");
                continue;
            }

            let slug = attachment_slug(file);
            let attachment_id = if let Some(existing) = attachment_ids.get(&slug).copied() {
                outcome.attachments_reused += 1;
                existing
            } else {
                let new_id = insert_attachment(
                    &mut *conn,
                    &NewAttachment {
                        title: file_stem(file).to_string(),
                        slug: slug.clone(),
                        parent_id: item_id,
                        author_id: options.author_id,
                        media_url: format!(
                            "{}/{}?v={}",
                            options.media_base_url, file, cache_buster
                        ),
                        mime_type: mime_for_file(file),
                    },
                )
                .await?;

                attachment_attrs.push(NewAttribute::new(new_id, keys::ATTACHED_FILE, file));
                attachment_attrs.push(NewAttribute::new(
                    new_id,
                    keys::ATTACHMENT_METADATA,
                    AttachmentMetadata::placeholder(file, cache_buster).to_json(),
                ));
                attachment_ids.insert(slug, new_id);
                outcome.attachments_created += 1;
                new_id
            };

            if primary.is_none() && is_primary_image(file, sku) {
                primary = Some(attachment_id);
            } else {
                gallery_new.push(attachment_id);
            }
        }

        if let Some(primary_id) = primary {
            thumbnails.entry(item_id).or_insert(primary_id);
        }
        if !gallery_new.is_empty() {
            galleries.entry(item_id).or_default().extend(gallery_new);
        }
    }

    insert_attributes(&mut *conn, &attachment_attrs).await?;

    let thumbnail_values: Vec<(i64, String)> = thumbnails
        .into_iter()
        .map(|(item_id, attachment_id)| (item_id, attachment_id.to_string()))
        .collect();
    upsert_single_valued(&mut *conn, keys::THUMBNAIL_ID, &thumbnail_values).await?;

    if !galleries.is_empty() {
        let gallery_items: Vec<i64> = galleries.keys().copied().collect();
        let existing = load_values_for_items(&mut *conn, keys::IMAGE_GALLERY, &gallery_items).await?;

        let gallery_values: Vec<(i64, String)> = galleries
            .into_iter()
            .map(|(item_id, new_ids)| {
                let merged = merge_gallery(existing.get(&item_id).map(String::as_str), &new_ids);
                (item_id, merged)
            })
            .collect();
        upsert_single_valued(&mut *conn, keys::IMAGE_GALLERY, &gallery_values).await?;
    }

    Ok(())
}

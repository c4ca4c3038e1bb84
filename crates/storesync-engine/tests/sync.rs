//! Live integration tests for the synchronization engine using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated tenant database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/storesync-engine/`), so `"../../tenant-schema"` resolves to the
//! workspace tenant schema directory.

use rust_decimal::Decimal;
use storesync_engine::{run_catalog_sync, EngineError, SyncOptions, SYNC_LOCK_KEY};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_options() -> SyncOptions {
    SyncOptions {
        batch_size: 100,
        media_base_url: "https://cdn.acme.test/uploads".to_string(),
        author_id: 1,
    }
}

/// Insert one staging row. `price` is given as a decimal string so fixtures
/// stay readable.
#[allow(clippy::too_many_arguments)]
async fn insert_source_product(
    pool: &sqlx::PgPool,
    sku: &str,
    name: &str,
    price: Option<&str>,
    stock: Option<i32>,
    category: Option<&str>,
    subcategory: Option<&str>,
    brand: Option<&str>,
    images: Option<&str>,
) {
    let price = price.map(|p| p.parse::<Decimal>().expect("fixture price must parse"));
    sqlx::query(
        "INSERT INTO source_products \
         (sku, name, description, price, stock, category, subcategory, brand, images) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(sku)
    .bind(name)
    .bind(format!("{name} description"))
    .bind(price)
    .bind(stock)
    .bind(category)
    .bind(subcategory)
    .bind(brand)
    .bind(images)
    .execute(pool)
    .await
    .unwrap_or_else(|e| panic!("insert_source_product failed for sku '{sku}': {e}"));
}

/// The product item carrying this `sku` attribute.
async fn product_id_by_sku(pool: &sqlx::PgPool, sku: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT ci.id FROM catalog_items ci \
         JOIN item_attributes ia ON ia.item_id = ci.id \
         WHERE ci.kind = 'product' AND ia.attr_key = 'sku' AND ia.attr_value = $1",
    )
    .bind(sku)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("no product item for sku '{sku}': {e}"))
}

async fn attachment_id_by_slug(pool: &sqlx::PgPool, slug: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM catalog_items WHERE kind = 'attachment' AND slug = $1",
    )
    .bind(slug)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("no attachment for slug '{slug}': {e}"))
}

async fn attr_value(pool: &sqlx::PgPool, item_id: i64, key: &str) -> Option<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT attr_value FROM item_attributes WHERE item_id = $1 AND attr_key = $2",
    )
    .bind(item_id)
    .bind(key)
    .fetch_optional(pool)
    .await
    .unwrap_or_else(|e| panic!("attr lookup failed for item {item_id} key '{key}': {e}"))
}

/// Assignment id for a term name under a vocabulary.
async fn assignment_id(pool: &sqlx::PgPool, vocabulary: &str, name: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT a.id FROM taxonomy_assignments a \
         JOIN taxonomy_terms t ON t.id = a.term_id \
         WHERE a.vocabulary = $1 AND t.name = $2",
    )
    .bind(vocabulary)
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("no '{vocabulary}' assignment for term '{name}': {e}"))
}

async fn relationship_exists(pool: &sqlx::PgPool, item_id: i64, assignment_id: i64) -> bool {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM term_relationships WHERE item_id = $1 AND assignment_id = $2",
    )
    .bind(item_id)
    .bind(assignment_id)
    .fetch_one(pool)
    .await
    .expect("relationship count failed");
    count > 0
}

async fn item_count_for(pool: &sqlx::PgPool, vocabulary: &str, name: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT a.item_count FROM taxonomy_assignments a \
         JOIN taxonomy_terms t ON t.id = a.term_id \
         WHERE a.vocabulary = $1 AND t.name = $2",
    )
    .bind(vocabulary)
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("no item_count for '{vocabulary}' term '{name}': {e}"))
}

/// Row counts for the four tables the transactional core writes.
async fn core_table_counts(pool: &sqlx::PgPool) -> (i64, i64, i64, i64) {
    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
        .fetch_one(pool)
        .await
        .expect("count catalog_items");
    let attrs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_attributes")
        .fetch_one(pool)
        .await
        .expect("count item_attributes");
    let terms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM taxonomy_terms")
        .fetch_one(pool)
        .await
        .expect("count taxonomy_terms");
    let rels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM term_relationships")
        .fetch_one(pool)
        .await
        .expect("count term_relationships");
    (items, attrs, terms, rels)
}

// ---------------------------------------------------------------------------
// Section 1: Item creation and update
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_creates_items_for_new_skus(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "SKU100",
        "Trail Shoe",
        Some("89.90"),
        Some(4),
        Some("Shoes"),
        None,
        Some("Acme"),
        None,
    )
    .await;
    insert_source_product(
        &pool,
        "SKU200",
        "Road Shoe",
        Some("120.00"),
        Some(0),
        Some("Shoes"),
        None,
        Some("Acme"),
        None,
    )
    .await;

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    assert_eq!(report.products_processed, 2);
    assert_eq!(report.items_created, 2);
    assert_eq!(report.items_updated, 0);

    let item_id = product_id_by_sku(&pool, "SKU100").await;
    let (kind, status, title, slug): (String, String, String, String) =
        sqlx::query_as("SELECT kind, status, title, slug FROM catalog_items WHERE id = $1")
            .bind(item_id)
            .fetch_one(&pool)
            .await
            .expect("fetch created item");

    assert_eq!(kind, "product");
    assert_eq!(status, "published");
    assert_eq!(title, "Trail Shoe");
    assert_eq!(slug, "sku100", "item slug should be the lowercased sku");

    assert_eq!(
        attr_value(&pool, item_id, "price").await.as_deref(),
        Some("89.90")
    );
    assert_eq!(
        attr_value(&pool, item_id, "regular_price").await.as_deref(),
        Some("89.90")
    );
    assert_eq!(
        attr_value(&pool, item_id, "stock").await.as_deref(),
        Some("4")
    );
    assert_eq!(
        attr_value(&pool, item_id, "stock_status").await.as_deref(),
        Some("in_stock")
    );
    assert_eq!(
        attr_value(&pool, item_id, "visibility").await.as_deref(),
        Some("visible")
    );

    let zero_stock_id = product_id_by_sku(&pool, "SKU200").await;
    assert_eq!(
        attr_value(&pool, zero_stock_id, "stock_status")
            .await
            .as_deref(),
        Some("out_of_stock"),
        "zero stock must read out_of_stock"
    );
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_updates_existing_items_in_place(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "SKU300",
        "Old Name",
        Some("10.00"),
        Some(1),
        None,
        None,
        None,
        None,
    )
    .await;
    run_catalog_sync(&pool, &test_options())
        .await
        .expect("first sync failed");
    let first_id = product_id_by_sku(&pool, "SKU300").await;

    sqlx::query(
        "UPDATE source_products SET name = 'New Name', price = 12.50, stock = 0 \
         WHERE sku = 'SKU300'",
    )
    .execute(&pool)
    .await
    .expect("mutate staging row");

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("second sync failed");

    assert_eq!(report.items_created, 0);
    assert_eq!(report.items_updated, 1);

    let second_id = product_id_by_sku(&pool, "SKU300").await;
    assert_eq!(first_id, second_id, "item id must be stable across runs");

    let title: String = sqlx::query_scalar("SELECT title FROM catalog_items WHERE id = $1")
        .bind(second_id)
        .fetch_one(&pool)
        .await
        .expect("fetch title");
    assert_eq!(title, "New Name");

    assert_eq!(
        attr_value(&pool, second_id, "price").await.as_deref(),
        Some("12.50")
    );
    assert_eq!(
        attr_value(&pool, second_id, "stock_status").await.as_deref(),
        Some("out_of_stock")
    );

    let price_rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM item_attributes WHERE item_id = $1 AND attr_key = 'price'",
    )
    .bind(second_id)
    .fetch_one(&pool)
    .await
    .expect("count price rows");
    assert_eq!(price_rows, 1, "price must stay single-valued after update");
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn duplicate_source_skus_first_row_wins(pool: sqlx::PgPool) {
    insert_source_product(
        &pool, "DUP1", "First Row", None, Some(5), None, None, None, None,
    )
    .await;
    insert_source_product(
        &pool, "DUP1", "Second Row", None, Some(9), None, None, None, None,
    )
    .await;

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    assert_eq!(report.products_processed, 2, "both rows are read");
    assert_eq!(report.items_created, 1, "only one item may be created");
    assert_eq!(report.items_updated, 0);

    let item_id = product_id_by_sku(&pool, "DUP1").await;
    let title: String = sqlx::query_scalar("SELECT title FROM catalog_items WHERE id = $1")
        .bind(item_id)
        .fetch_one(&pool)
        .await
        .expect("fetch title");
    assert_eq!(title, "First Row", "the earlier staging row wins");
    assert_eq!(
        attr_value(&pool, item_id, "stock").await.as_deref(),
        Some("5"),
        "scalar attributes come from the winning row"
    );
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn missing_price_and_stock_write_partial_scalars(pool: sqlx::PgPool) {
    insert_source_product(&pool, "NP1", "No Numbers", None, None, None, None, None, None).await;

    run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    let item_id = product_id_by_sku(&pool, "NP1").await;
    assert_eq!(attr_value(&pool, item_id, "price").await, None);
    assert_eq!(attr_value(&pool, item_id, "regular_price").await, None);
    assert_eq!(attr_value(&pool, item_id, "stock").await, None);
    assert_eq!(
        attr_value(&pool, item_id, "stock_status").await.as_deref(),
        Some("out_of_stock"),
        "stock_status is always written"
    );
    assert_eq!(
        attr_value(&pool, item_id, "manage_stock").await.as_deref(),
        Some("yes")
    );
    assert_eq!(
        attr_value(&pool, item_id, "backorders").await.as_deref(),
        Some("no")
    );
    assert_eq!(
        attr_value(&pool, item_id, "sold_individually")
            .await
            .as_deref(),
        Some("no")
    );
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn rows_without_sku_or_name_are_ignored(pool: sqlx::PgPool) {
    insert_source_product(&pool, "", "Blank Sku", None, None, None, None, None, None).await;
    insert_source_product(&pool, "NAMELESS", "", None, None, None, None, None, None).await;
    insert_source_product(&pool, "GOOD1", "Good Row", None, None, None, None, None, None).await;

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    assert_eq!(report.products_processed, 1, "only the complete row counts");
    assert_eq!(report.items_created, 1);

    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
        .fetch_one(&pool)
        .await
        .expect("count items");
    assert_eq!(items, 1);
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_with_empty_staging_completes_cleanly(pool: sqlx::PgPool) {
    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    assert_eq!(report.products_processed, 0);
    assert_eq!(report.items_created, 0);
    assert_eq!(report.items_updated, 0);
    assert_eq!(report.relationships_added, 0);
    assert_eq!(report.attachments_created, 0);
}

// ---------------------------------------------------------------------------
// Section 2: Idempotency
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_is_idempotent_across_repeat_runs(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "IDEM1",
        "Widget",
        Some("19.99"),
        Some(3),
        Some("Tools"),
        Some("Hand Tools"),
        Some("Acme"),
        Some(r#"["idem1.jpg","idem1-1.jpg"]"#),
    )
    .await;
    insert_source_product(
        &pool,
        "IDEM2",
        "Gadget",
        Some("5.00"),
        None,
        Some("Tools"),
        None,
        None,
        None,
    )
    .await;

    run_catalog_sync(&pool, &test_options())
        .await
        .expect("first sync failed");

    let first_counts = core_table_counts(&pool).await;
    let first_id = product_id_by_sku(&pool, "IDEM1").await;
    let first_gallery = attr_value(&pool, first_id, "image_gallery").await;

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("second sync failed");

    assert_eq!(report.items_created, 0, "second run must create nothing");
    assert_eq!(report.items_updated, 2);
    assert_eq!(report.relationships_added, 0);
    assert_eq!(report.relationships_removed, 0);
    assert_eq!(report.attachments_created, 0);
    assert_eq!(report.attachments_reused, 2);

    let second_counts = core_table_counts(&pool).await;
    assert_eq!(
        first_counts, second_counts,
        "row counts must not drift across identical runs"
    );
    assert_eq!(
        product_id_by_sku(&pool, "IDEM1").await,
        first_id,
        "item ids must be stable"
    );
    assert_eq!(
        attr_value(&pool, first_id, "image_gallery").await,
        first_gallery,
        "gallery must not accumulate duplicates"
    );
}

// ---------------------------------------------------------------------------
// Section 3: Taxonomy and relationships
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_links_items_to_category_and_brand_terms(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "TX1",
        "Trail Shoe",
        None,
        Some(1),
        Some("Shoes"),
        Some("Sneakers"),
        Some("Acme"),
        None,
    )
    .await;

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");
    assert_eq!(report.relationships_added, 3);

    let item_id = product_id_by_sku(&pool, "TX1").await;
    let shoes = assignment_id(&pool, "category", "Shoes").await;
    let sneakers = assignment_id(&pool, "category", "Sneakers").await;
    let acme = assignment_id(&pool, "brand", "Acme").await;

    let parent: i64 = sqlx::query_scalar("SELECT parent_id FROM taxonomy_assignments WHERE id = $1")
        .bind(sneakers)
        .fetch_one(&pool)
        .await
        .expect("fetch subcategory parent");
    assert_eq!(
        parent, shoes,
        "subcategory assignment must be parented on its category"
    );

    for (name, aid) in [("Shoes", shoes), ("Sneakers", sneakers), ("Acme", acme)] {
        assert!(
            relationship_exists(&pool, item_id, aid).await,
            "expected relationship to '{name}'"
        );
    }
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_moves_item_between_brands(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "TX2",
        "Hammer",
        None,
        Some(1),
        Some("Tools"),
        None,
        Some("Acme"),
        None,
    )
    .await;
    run_catalog_sync(&pool, &test_options())
        .await
        .expect("first sync failed");

    sqlx::query("UPDATE source_products SET brand = 'Zenith' WHERE sku = 'TX2'")
        .execute(&pool)
        .await
        .expect("mutate brand");

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("second sync failed");

    assert_eq!(report.relationships_added, 1, "the new brand link");
    assert_eq!(report.relationships_removed, 1, "the old brand link");

    let item_id = product_id_by_sku(&pool, "TX2").await;
    let acme = assignment_id(&pool, "brand", "Acme").await;
    let zenith = assignment_id(&pool, "brand", "Zenith").await;
    let tools = assignment_id(&pool, "category", "Tools").await;

    assert!(
        !relationship_exists(&pool, item_id, acme).await,
        "old brand link must be removed"
    );
    assert!(relationship_exists(&pool, item_id, zenith).await);
    assert!(
        relationship_exists(&pool, item_id, tools).await,
        "category link must survive the brand change"
    );

    assert_eq!(item_count_for(&pool, "brand", "Acme").await, 0);
    assert_eq!(item_count_for(&pool, "brand", "Zenith").await, 1);
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn term_counts_track_membership(pool: sqlx::PgPool) {
    for i in 1..=3 {
        insert_source_product(
            &pool,
            &format!("CNT{i}"),
            &format!("Shoe {i}"),
            None,
            Some(1),
            Some("Shoes"),
            None,
            None,
            None,
        )
        .await;
    }
    run_catalog_sync(&pool, &test_options())
        .await
        .expect("first sync failed");
    assert_eq!(item_count_for(&pool, "category", "Shoes").await, 3);

    for i in 4..=6 {
        insert_source_product(
            &pool,
            &format!("CNT{i}"),
            &format!("Shoe {i}"),
            None,
            Some(1),
            Some("Shoes"),
            None,
            None,
            None,
        )
        .await;
    }
    run_catalog_sync(&pool, &test_options())
        .await
        .expect("second sync failed");
    assert_eq!(item_count_for(&pool, "category", "Shoes").await, 6);
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn subcategory_without_parent_category_is_left_unassigned(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "OR1",
        "Orphan",
        None,
        None,
        None,
        Some("Sneakers"),
        None,
        None,
    )
    .await;

    run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync should succeed despite the orphan subcategory");

    let terms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM taxonomy_terms WHERE name = 'Sneakers'")
        .fetch_one(&pool)
        .await
        .expect("count terms");
    assert_eq!(terms, 1, "the term itself is still created");

    let assignments: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM taxonomy_assignments a \
         JOIN taxonomy_terms t ON t.id = a.term_id \
         WHERE t.name = 'Sneakers' AND a.vocabulary = 'category'",
    )
    .fetch_one(&pool)
    .await
    .expect("count assignments");
    assert_eq!(assignments, 0, "no assignment without a parent category");

    let item_id = product_id_by_sku(&pool, "OR1").await;
    let rels: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM term_relationships WHERE item_id = $1")
            .bind(item_id)
            .fetch_one(&pool)
            .await
            .expect("count relationships");
    assert_eq!(rels, 0, "an unassigned term cannot be linked");
}

// ---------------------------------------------------------------------------
// Section 4: Images
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_attaches_images_and_picks_featured(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "SKU123",
        "Widget",
        Some("9.99"),
        Some(2),
        None,
        None,
        None,
        Some(r#"["sku123-1.jpg","sku123.jpg","sku123-2.jpg"]"#),
    )
    .await;

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    assert_eq!(report.attachments_created, 3);
    assert_eq!(report.attachments_reused, 0);

    let item_id = product_id_by_sku(&pool, "SKU123").await;
    let featured = attachment_id_by_slug(&pool, "sku123").await;
    let gallery_a = attachment_id_by_slug(&pool, "sku123-1").await;
    let gallery_b = attachment_id_by_slug(&pool, "sku123-2").await;

    // The suffix-free file becomes the featured image even though it is not
    // first in the list.
    assert_eq!(
        attr_value(&pool, item_id, "thumbnail_id").await,
        Some(featured.to_string())
    );
    assert_eq!(
        attr_value(&pool, item_id, "image_gallery").await,
        Some(format!("{gallery_a},{gallery_b}")),
        "gallery keeps source order minus the featured file"
    );

    let (kind, parent_id, media_url, mime_type): (String, i64, String, String) = sqlx::query_as(
        "SELECT kind, parent_id, media_url, mime_type FROM catalog_items WHERE id = $1",
    )
    .bind(featured)
    .fetch_one(&pool)
    .await
    .expect("fetch attachment row");

    assert_eq!(kind, "attachment");
    assert_eq!(parent_id, item_id, "attachment must point at its product");
    assert!(
        media_url.starts_with("https://cdn.acme.test/uploads/sku123.jpg?v="),
        "media url should carry a cache-busting version: {media_url}"
    );
    assert_eq!(mime_type, "image/jpeg");

    assert_eq!(
        attr_value(&pool, featured, "attached_file").await.as_deref(),
        Some("sku123.jpg")
    );
    let meta_json = attr_value(&pool, featured, "attachment_metadata")
        .await
        .expect("attachment_metadata attr");
    let meta: serde_json::Value = serde_json::from_str(&meta_json).expect("metadata is JSON");
    assert_eq!(meta["file"], "sku123.jpg");
    assert_eq!(meta["width"], 800, "URL mode records placeholder dimensions");
    assert_eq!(meta["height"], 800);
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn second_sync_reuses_attachments(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "SKU124",
        "Widget",
        None,
        Some(1),
        None,
        None,
        None,
        Some(r#"["sku124.jpg","sku124-1.jpg"]"#),
    )
    .await;

    run_catalog_sync(&pool, &test_options())
        .await
        .expect("first sync failed");
    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("second sync failed");

    assert_eq!(report.attachments_created, 0, "nothing new to create");
    assert_eq!(report.attachments_reused, 2);

    let attachments: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items WHERE kind = 'attachment'")
            .fetch_one(&pool)
            .await
            .expect("count attachments");
    assert_eq!(attachments, 2, "attachments must not be duplicated");

    let item_id = product_id_by_sku(&pool, "SKU124").await;
    let gallery = attachment_id_by_slug(&pool, "sku124-1").await;
    assert_eq!(
        attr_value(&pool, item_id, "image_gallery").await,
        Some(gallery.to_string()),
        "gallery value is unchanged after the reuse pass"
    );
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn malformed_image_lists_are_skipped(pool: sqlx::PgPool) {
    insert_source_product(
        &pool,
        "BADIMG",
        "Broken",
        None,
        None,
        None,
        None,
        None,
        Some("not a json array"),
    )
    .await;

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("a malformed image list must not fail the run");

    assert_eq!(report.attachments_created, 0);
    let attachments: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items WHERE kind = 'attachment'")
            .fetch_one(&pool)
            .await
            .expect("count attachments");
    assert_eq!(attachments, 0);
}

// ---------------------------------------------------------------------------
// Section 5: Housekeeping (cached options, checkout drafts)
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_purges_cached_option_fragments(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO site_options (name, value) VALUES \
         ('cached:home-page', 'stale html'), ('theme', 'dark')",
    )
    .execute(&pool)
    .await
    .expect("seed site_options");

    run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    let cached: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM site_options WHERE name LIKE 'cached:%'")
            .fetch_one(&pool)
            .await
            .expect("count cached options");
    assert_eq!(cached, 0, "cached fragments must be purged");

    let theme: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM site_options WHERE name = 'theme'")
        .fetch_one(&pool)
        .await
        .expect("count theme option");
    assert_eq!(theme, 1, "ordinary options must survive");
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn sync_deletes_anonymous_checkout_drafts(pool: sqlx::PgPool) {
    sqlx::query(
        "INSERT INTO orders (status, customer_id, total_amount) VALUES \
         ('checkout-draft', NULL, 0), \
         ('checkout-draft', 7, 0), \
         ('completed', NULL, 10.00)",
    )
    .execute(&pool)
    .await
    .expect("seed orders");

    let report = run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync failed");

    assert_eq!(report.drafts_deleted, 1, "only the anonymous draft goes");

    let statuses: Vec<String> =
        sqlx::query_scalar("SELECT status FROM orders ORDER BY status")
            .fetch_all(&pool)
            .await
            .expect("fetch remaining orders");
    assert_eq!(
        statuses,
        vec!["checkout-draft".to_string(), "completed".to_string()],
        "drafts with a customer and completed orders must survive"
    );
}

// ---------------------------------------------------------------------------
// Section 6: Locking and atomicity
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../tenant-schema")]
async fn concurrent_sync_is_rejected_while_lock_held(pool: sqlx::PgPool) {
    let mut holder = pool.acquire().await.expect("acquire lock-holder connection");
    let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(SYNC_LOCK_KEY)
        .fetch_one(&mut *holder)
        .await
        .expect("take advisory lock");
    assert!(locked, "test connection should win the free lock");

    let err = run_catalog_sync(&pool, &test_options())
        .await
        .expect_err("sync must refuse to start while the lock is held");
    assert!(
        matches!(err, EngineError::SyncInProgress),
        "expected SyncInProgress, got: {err:?}"
    );

    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(SYNC_LOCK_KEY)
        .execute(&mut *holder)
        .await
        .expect("release advisory lock");

    run_catalog_sync(&pool, &test_options())
        .await
        .expect("sync after unlock should succeed");
}

#[sqlx::test(migrations = "../../tenant-schema")]
async fn failed_run_rolls_back_the_transactional_core(pool: sqlx::PgPool) {
    // Constrain titles so a row in the last batch fails mid-run.
    sqlx::query(
        "ALTER TABLE catalog_items ADD CONSTRAINT short_titles CHECK (char_length(title) <= 20)",
    )
    .execute(&pool)
    .await
    .expect("add check constraint");

    insert_source_product(
        &pool,
        "AAA1",
        "Fine",
        None,
        Some(1),
        Some("Tools"),
        None,
        Some("Acme"),
        None,
    )
    .await;
    insert_source_product(&pool, "BBB2", "Also Fine", None, Some(1), None, None, None, None).await;
    insert_source_product(
        &pool,
        "ZZZ9",
        "This title is far too long for the constraint",
        None,
        Some(1),
        None,
        None,
        None,
        None,
    )
    .await;

    let mut options = test_options();
    options.batch_size = 2;

    let err = run_catalog_sync(&pool, &options)
        .await
        .expect_err("the oversized title must fail the run");
    assert!(matches!(err, EngineError::Db(_)), "expected Db, got: {err:?}");

    // Work from the earlier, successful batch must be rolled back too.
    let (items, attrs, terms, rels) = core_table_counts(&pool).await;
    assert_eq!(items, 0, "no catalog items may survive the rollback");
    assert_eq!(attrs, 0, "no attributes may survive the rollback");
    assert_eq!(terms, 0, "no taxonomy terms may survive the rollback");
    assert_eq!(rels, 0, "no relationships may survive the rollback");

    // The lock was released, so a corrected source set syncs normally.
    sqlx::query("UPDATE source_products SET name = 'Trimmed' WHERE sku = 'ZZZ9'")
        .execute(&pool)
        .await
        .expect("fix staging row");
    let report = run_catalog_sync(&pool, &options)
        .await
        .expect("retry after fix should succeed");
    assert_eq!(report.items_created, 3);
}

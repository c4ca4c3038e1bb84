//! Domain constants and pure derivations for the tenant catalog schema.

use rust_decimal::Decimal;

/// Attribute keys written by the sync engine.
pub mod keys {
    /// Join key linking a catalog item back to its source row.
    pub const SKU: &str = "sku";
    pub const PRICE: &str = "price";
    pub const REGULAR_PRICE: &str = "regular_price";
    pub const STOCK: &str = "stock";
    pub const STOCK_STATUS: &str = "stock_status";
    pub const VISIBILITY: &str = "visibility";
    pub const MANAGE_STOCK: &str = "manage_stock";
    pub const BACKORDERS: &str = "backorders";
    pub const SOLD_INDIVIDUALLY: &str = "sold_individually";
    pub const THUMBNAIL_ID: &str = "thumbnail_id";
    pub const IMAGE_GALLERY: &str = "image_gallery";
    pub const ATTACHED_FILE: &str = "attached_file";
    pub const ATTACHMENT_METADATA: &str = "attachment_metadata";
}

/// The scalar attribute family: exactly the keys deleted and rewritten for
/// every updated item on each run. Deliberately excludes [`keys::SKU`] (the
/// stable join key) and the image family, which uses upsert semantics.
pub const SCALAR_ATTRIBUTE_KEYS: [&str; 8] = [
    keys::PRICE,
    keys::REGULAR_PRICE,
    keys::STOCK,
    keys::STOCK_STATUS,
    keys::VISIBILITY,
    keys::MANAGE_STOCK,
    keys::BACKORDERS,
    keys::SOLD_INDIVIDUALLY,
];

pub const KIND_PRODUCT: &str = "product";
pub const KIND_ATTACHMENT: &str = "attachment";
pub const STATUS_PUBLISHED: &str = "published";

pub const VOCABULARY_CATEGORY: &str = "category";
pub const VOCABULARY_BRAND: &str = "brand";

pub const IN_STOCK: &str = "in_stock";
pub const OUT_OF_STOCK: &str = "out_of_stock";

/// Prefix of `site_options` rows holding cached page fragments; purged at the
/// end of every sync run.
pub const CACHED_OPTION_PREFIX: &str = "cached:";

pub const ORDER_STATUS_COMPLETED: &str = "completed";
pub const ORDER_STATUS_CHECKOUT_DRAFT: &str = "checkout-draft";

/// Slug used for catalog items and taxonomy terms: lowercase with spaces
/// replaced by hyphens. Intentionally preserves every other character so the
/// slug stays reversible against the source value.
#[must_use]
pub fn slugify(value: &str) -> String {
    value.to_lowercase().replace(' ', "-")
}

/// Stock status derived from the source quantity. A missing quantity reads
/// as zero, so unknown stock reports out-of-stock rather than available.
#[must_use]
pub fn stock_status(stock: Option<i32>) -> &'static str {
    if stock.unwrap_or(0) > 0 {
        IN_STOCK
    } else {
        OUT_OF_STOCK
    }
}

/// The scalar attribute rows for one product, in write order.
///
/// A `None` price skips both price keys, and a `None` stock skips the raw
/// `stock` key — but `stock_status` is always written, because downstream
/// storefront queries filter on it.
#[must_use]
pub fn scalar_attributes(price: Option<Decimal>, stock: Option<i32>) -> Vec<(&'static str, String)> {
    let mut attrs = Vec::with_capacity(SCALAR_ATTRIBUTE_KEYS.len());

    if let Some(price) = price {
        attrs.push((keys::PRICE, price.to_string()));
        attrs.push((keys::REGULAR_PRICE, price.to_string()));
    }
    if let Some(stock) = stock {
        attrs.push((keys::STOCK, stock.to_string()));
    }
    attrs.push((keys::STOCK_STATUS, stock_status(stock).to_string()));
    attrs.push((keys::VISIBILITY, "visible".to_string()));
    attrs.push((keys::MANAGE_STOCK, "yes".to_string()));
    attrs.push((keys::BACKORDERS, "no".to_string()));
    attrs.push((keys::SOLD_INDIVIDUALLY, "no".to_string()));

    attrs
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Garden Tools"), "garden-tools");
        assert_eq!(slugify("SKU 10 X"), "sku-10-x");
    }

    #[test]
    fn slugify_preserves_non_space_punctuation() {
        assert_eq!(slugify("A&B Co."), "a&b-co.");
    }

    #[test]
    fn stock_status_positive_is_in_stock() {
        assert_eq!(stock_status(Some(3)), IN_STOCK);
    }

    #[test]
    fn stock_status_zero_negative_or_missing_is_out_of_stock() {
        assert_eq!(stock_status(Some(0)), OUT_OF_STOCK);
        assert_eq!(stock_status(Some(-1)), OUT_OF_STOCK);
        assert_eq!(stock_status(None), OUT_OF_STOCK);
    }

    #[test]
    fn scalar_attributes_full_row() {
        let attrs = scalar_attributes(Some(Decimal::new(2499, 2)), Some(7));
        let lookup = |key: &str| {
            attrs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(lookup(keys::PRICE), Some("24.99"));
        assert_eq!(lookup(keys::REGULAR_PRICE), Some("24.99"));
        assert_eq!(lookup(keys::STOCK), Some("7"));
        assert_eq!(lookup(keys::STOCK_STATUS), Some(IN_STOCK));
        assert_eq!(lookup(keys::VISIBILITY), Some("visible"));
        assert_eq!(lookup(keys::MANAGE_STOCK), Some("yes"));
        assert_eq!(lookup(keys::BACKORDERS), Some("no"));
        assert_eq!(lookup(keys::SOLD_INDIVIDUALLY), Some("no"));
        assert_eq!(attrs.len(), 8);
    }

    #[test]
    fn scalar_attributes_skips_missing_price() {
        let attrs = scalar_attributes(None, Some(2));
        assert!(attrs.iter().all(|(k, _)| *k != keys::PRICE));
        assert!(attrs.iter().all(|(k, _)| *k != keys::REGULAR_PRICE));
        assert_eq!(attrs.len(), 6);
    }

    #[test]
    fn scalar_attributes_missing_stock_still_derives_status() {
        let attrs = scalar_attributes(Some(Decimal::new(500, 2)), None);
        assert!(attrs.iter().all(|(k, _)| *k != keys::STOCK));
        assert!(attrs
            .iter()
            .any(|(k, v)| *k == keys::STOCK_STATUS && v == OUT_OF_STOCK));
    }

    #[test]
    fn scalar_keys_exclude_sku_and_image_family() {
        assert!(!SCALAR_ATTRIBUTE_KEYS.contains(&keys::SKU));
        assert!(!SCALAR_ATTRIBUTE_KEYS.contains(&keys::THUMBNAIL_ID));
        assert!(!SCALAR_ATTRIBUTE_KEYS.contains(&keys::IMAGE_GALLERY));
        assert!(!SCALAR_ATTRIBUTE_KEYS.contains(&keys::ATTACHED_FILE));
        assert!(!SCALAR_ATTRIBUTE_KEYS.contains(&keys::ATTACHMENT_METADATA));
    }
}

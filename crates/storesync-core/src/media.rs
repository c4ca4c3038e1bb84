//! Filename, MIME, and attachment-shape helpers shared by both image
//! ingestion modes (source-row URLs and remote-listing attach).

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Extensions recognized as images when browsing a remote listing.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];

/// Extensions eligible for product attachment. SVG is browsable but never
/// attached, matching storefront rendering constraints.
pub const ATTACHABLE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Final path segment of a URL, with any query string or fragment stripped.
#[must_use]
pub fn file_name_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Filename without its final extension. Names with no dot (or only a
/// leading dot) are returned unchanged.
#[must_use]
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => &file_name[..idx],
        _ => file_name,
    }
}

/// Slug under which an attachment row is stored and deduplicated:
/// the file stem with interior dots flattened to hyphens, lowercased.
#[must_use]
pub fn attachment_slug(file_name: &str) -> String {
    file_stem(file_name).replace('.', "-").to_lowercase()
}

/// MIME type from the file extension, falling back to `image/jpeg` for
/// anything unrecognized.
#[must_use]
pub fn mime_for_file(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first()
        .map_or_else(|| "image/jpeg".to_string(), |m| m.essence_str().to_string())
}

#[must_use]
pub fn has_image_extension(file_name: &str) -> bool {
    extension_matches(file_name, &IMAGE_EXTENSIONS)
}

#[must_use]
pub fn has_attachable_extension(file_name: &str) -> bool {
    extension_matches(file_name, &ATTACHABLE_EXTENSIONS)
}

fn extension_matches(file_name: &str, allowed: &[&str]) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| allowed.iter().any(|a| ext.eq_ignore_ascii_case(a)))
}

/// Featured-image rule for the source-row sync: the file stem must equal the
/// SKU, ignoring case and surrounding whitespace. First match wins; callers
/// enforce the first-wins part.
#[must_use]
pub fn is_primary_image(file_name: &str, sku: &str) -> bool {
    file_stem(file_name).trim().eq_ignore_ascii_case(sku.trim())
}

/// Featured-image rule for listing-based attach, where filenames carry
/// positional suffixes: `sku.jpg`, `sku-0.jpg`, and suffix-free names are
/// primary; `sku-1.jpg` and up are gallery images.
#[must_use]
pub fn is_listing_primary(stem: &str, sku: &str) -> bool {
    let zero_suffix = Regex::new(r"[-_]0$").expect("valid regex");
    let index_suffix = Regex::new(r"[-_]\d+$").expect("valid regex");

    stem == sku || zero_suffix.is_match(stem) || !index_suffix.is_match(stem)
}

/// Candidate SKU for a listing filename: the stem with one trailing
/// `-N` / `_N` positional suffix removed.
#[must_use]
pub fn sku_from_file_stem(stem: &str) -> String {
    let index_suffix = Regex::new(r"[-_]\d+$").expect("valid regex");
    index_suffix.replace(stem, "").into_owned()
}

/// Merge newly attached ids into an existing comma-separated gallery list.
///
/// Existing entries keep their order; new ids append in attach order;
/// duplicates collapse to their first occurrence.
#[must_use]
pub fn merge_gallery(existing: Option<&str>, new_ids: &[i64]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut ordered: Vec<String> = Vec::new();

    if let Some(existing) = existing {
        for entry in existing.split(',') {
            let entry = entry.trim();
            if !entry.is_empty() && seen.insert(entry.to_string()) {
                ordered.push(entry.to_string());
            }
        }
    }

    for id in new_ids {
        let entry = id.to_string();
        if seen.insert(entry.clone()) {
            ordered.push(entry);
        }
    }

    ordered.join(",")
}

/// Stored shape of the `attachment_metadata` attribute. The EXIF-like block
/// is always present with zeroed fields so storefront consumers can index
/// into it unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub width: u32,
    pub height: u32,
    pub file: String,
    pub sizes: Vec<serde_json::Value>,
    pub image_meta: ImageMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMeta {
    pub aperture: String,
    pub credit: String,
    pub camera: String,
    pub caption: String,
    pub created_timestamp: i64,
    pub copyright: String,
    pub focal_length: String,
    pub iso: String,
    pub shutter_speed: String,
    pub title: String,
    pub orientation: String,
    pub keywords: Vec<String>,
}

impl AttachmentMetadata {
    #[must_use]
    pub fn new(width: u32, height: u32, file: &str, created_timestamp: i64) -> Self {
        Self {
            width,
            height,
            file: file.to_string(),
            sizes: Vec::new(),
            image_meta: ImageMeta {
                aperture: "0".to_string(),
                credit: String::new(),
                camera: String::new(),
                caption: String::new(),
                created_timestamp,
                copyright: String::new(),
                focal_length: "0".to_string(),
                iso: "0".to_string(),
                shutter_speed: "0".to_string(),
                title: String::new(),
                orientation: "0".to_string(),
                keywords: Vec::new(),
            },
        }
    }

    /// Placeholder dimensions used when the actual image bytes are never
    /// fetched (source-row URL mode).
    #[must_use]
    pub fn placeholder(file: &str, created_timestamp: i64) -> Self {
        Self::new(800, 800, file, created_timestamp)
    }

    /// The stored string form. Serialization of this shape cannot fail, so
    /// the fallback empty object is never expected to appear.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

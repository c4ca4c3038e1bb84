//! Catalog synchronization engine.
//!
//! Reconciles tenant source products into the e-commerce item schema:
//! taxonomy upserts, item creation and updates, scalar attribute rewrites,
//! relationship diffs, term counts, cached-option purges, image
//! attachments, and the standalone listing-service attach flow.

pub mod attach;
pub mod error;
mod images;
pub mod listing;
mod meta;
mod reconcile;
mod relationships;
pub mod run;

pub use attach::{
    attach_from_listing, match_listing_skus, AttachOptions, AttachedImage, ListingAttachReport,
    SkippedImage, SkuMatch,
};
pub use error::EngineError;
pub use listing::{ListingClient, ListingError, RemoteFile};
pub use run::{run_catalog_sync, SyncOptions, SyncReport, SYNC_LOCK_KEY};

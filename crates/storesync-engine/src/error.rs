use thiserror::Error;

use crate::listing::ListingError;

/// Errors surfaced by a synchronization or attach run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The per-catalog advisory lock is held by another run. Callers map
    /// this to a conflict response rather than a failure.
    #[error("another synchronization run is already in progress for this catalog")]
    SyncInProgress,

    /// Any database failure inside the run. The transactional core has
    /// already rolled back by the time this propagates.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Remote file-listing failure during a listing-based attach.
    #[error(transparent)]
    Listing(#[from] ListingError),
}

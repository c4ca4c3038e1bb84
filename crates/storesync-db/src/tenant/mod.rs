//! Queries against a tenant's target database.
//!
//! Every function here takes `&mut PgConnection` rather than a pool: the
//! sync engine runs all catalog writes on one connection so the session
//! advisory lock and the core transaction stay on the same backend. Callers
//! inside a transaction pass `&mut *tx`.

pub mod attributes;
pub mod items;
pub mod options;
pub mod orders;
pub mod relationships;
pub mod source;
pub mod taxonomy;

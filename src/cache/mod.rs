//! Result cache for calculations
//!
//! One in-memory partition per operation type, with hit/miss accounting that
//! is reported through `/api/cache/stats`. Partitions are unbounded and live
//! for the lifetime of the process unless explicitly cleared.

use thiserror::Error;

use crate::schema::UnknownOperationType;

pub mod store;

pub use store::*;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    UnknownOperationType(#[from] UnknownOperationType),
}

//! Prometheus metrics
//!
//! - a process-wide recorder installed once at startup
//! - `/metrics` endpoint guarded by an optional IP allowlist
//! - helpers that keep label cardinality bounded (route templates, status buckets)

pub mod endpoint;
pub mod metrics;
pub mod recorder;

pub use endpoint::*;
pub use metrics::*;
pub use recorder::*;

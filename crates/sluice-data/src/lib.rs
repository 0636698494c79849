//! Per-request data store with a non-blocking snapshot read.
//!
//! This crate provides:
//! - `DataSource` - A value, a future, or a future factory
//! - `DataStore` - Resolves its source at most once and caches the result
//! - `Snapshot` - `Ready`, `Pending` or `Failed` view of the store
//! - `PendingData` - Shareable future to await before reading again

mod error;
mod source;
mod store;

pub use error::*;
pub use source::*;
pub use store::*;

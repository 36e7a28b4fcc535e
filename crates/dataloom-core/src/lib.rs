//! dataloom-core: Shared cache and error types
//!
//! This crate contains the state every dataloom engine shares:
//! - Record cache keyed by `(resource, id)` with versioned entries
//! - Per-key snapshot and restore for mutation rollback
//! - Fetching/staleness bookkeeping read by query observers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                dataloom-core                 │
//! ├─────────────────────────────────────────────┤
//! │  cache/  - Record cache and change events   │
//! │  error   - Core error types                 │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;

// Re-export commonly used types at the crate root
pub use cache::{CacheEntry, CacheEvent, CacheKey, RecordCache, RecordCacheConfig, Snapshot};
pub use error::{CoreError, CoreResult};

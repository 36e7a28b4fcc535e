//! Read-by-id request aggregation.
//!
//! Independent callers asking for records of the same resource during one
//! scheduling tick share a single provider call:
//!
//! 1. **Merge**: every caller's ids are appended to the resource's
//!    accumulating window; duplicates keep their first position
//! 2. **Flush**: at the tick boundary the window is detached and one
//!    `get_many` is issued with the union of ids
//! 3. **Fan-out**: each caller receives its own ids, in its own order, with
//!    `None` where the provider had no record
//!
//! Freshness across ticks is the cache's concern: [`GetManyQuery`] consults
//! the record cache before asking the aggregator at all.

mod aggregator;
mod query;
mod types;
mod window;

pub use aggregator::{register_aggregator_metrics, PendingRead, RequestAggregator};
pub use query::{ErrorCallback, GetManyQuery, QueryOptions, QueryState, SuccessCallback};
pub use types::{
    AggregateError, AggregateResult, AggregatorConfig, IdSet, ReadResult, RequestOptions,
};
pub use window::CallBatchWindow;

#[cfg(test)]
mod tests;

//! Read aggregation and mutation handlers.

pub mod aggregate;
pub mod mutation;

pub use aggregate::{GetManyQuery, QueryOptions, QueryState, RequestAggregator};
pub use mutation::{MutationController, MutationMode, MutationOptions, UpdateHandle};

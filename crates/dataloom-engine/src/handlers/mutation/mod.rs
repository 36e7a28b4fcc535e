//! Mutation controller with optimistic, undoable and pessimistic modes.
//!
//! Every update walks the same state machine:
//!
//! ```text
//! idle -> pending -> confirmed -> settled
//!                 \-> cancelled -> settled
//! ```
//!
//! - **Pessimistic**: the provider is called first; the cache is written only
//!   with the authoritative record
//! - **Optimistic**: the projected record is written right away and the call
//!   runs in the background; a failure restores the snapshot
//! - **Undoable**: like optimistic, but the call waits for the mutation's own
//!   [`UndoHandle`]; cancelling restores the snapshot and never calls the
//!   provider
//!
//! Exactly one of `on_success`, `on_error` or `on_cancel` fires, once, after
//! the cache reached its final state.

mod controller;
mod types;
mod undo;

pub use controller::{MutationController, UpdateHandle};
pub use types::{
    MutationConfig, MutationError, MutationId, MutationMode, MutationOptions, MutationOutcome,
    MutationRecord, MutationResult, MutationStatus,
};
pub use undo::{UndoDecision, UndoHandle};

/// Registers mutation metrics descriptions.
///
/// # Metrics Registered
///
/// - `dataloom_mutations_total` - Settled mutations, labelled by `mode` and
///   `outcome`
pub fn register_mutation_metrics() {
    metrics::describe_counter!(
        "dataloom_mutations_total",
        "Total number of settled mutations by mode and outcome"
    );
}

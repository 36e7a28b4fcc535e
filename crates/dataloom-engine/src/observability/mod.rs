//! Observability infrastructure for dataloom.
//!
//! This module provides:
//! - Structured logging configuration
//! - Metric descriptions for every counter the engine records

mod logging;

pub use logging::{create_json_layer, init_logging, LoggingConfig};

/// Registers descriptions for every dataloom metric.
///
/// Call once at startup, after installing a metrics recorder.
pub fn register_metrics() {
    dataloom_core::cache::register_record_cache_metrics();
    crate::handlers::aggregate::register_aggregator_metrics();
    crate::handlers::mutation::register_mutation_metrics();
}

//! dataloom-engine: Request aggregation and mutation consistency
//!
//! This crate contains the engine layer including:
//! - Request aggregator merging same-tick reads into one provider call
//! - Read query observer with loading and error state
//! - Mutation controller with optimistic, undoable and pessimistic modes
//! - Configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              dataloom-engine                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs   - Configuration management     │
//! │  layer.rs    - Cache/aggregator/controller  │
//! │  handlers/   - Engines                      │
//! │    aggregate/  - Batched reads, queries     │
//! │    mutation/   - Updates, undo, rollback    │
//! │  observability/ - Logging, metrics          │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod layer;
pub mod observability;

// Re-exports for convenience
pub use config::{ConfigLoadError, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use layer::DataLayer;

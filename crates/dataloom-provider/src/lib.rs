//! dataloom-provider: Data provider abstraction layer
//!
//! This crate provides the backend-agnostic side of dataloom, including:
//! - Record and identifier model shared by every layer
//! - DataProvider trait for CRUD-style operations
//! - In-memory implementation for testing and demos
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             dataloom-provider                │
//! ├─────────────────────────────────────────────┤
//! │  record.rs  - Identifier and Record model   │
//! │  traits.rs  - DataProvider trait definition │
//! │  memory.rs  - In-memory implementation      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod record;
pub mod traits;

// Re-export commonly used types
pub use error::{ProviderError, ProviderResult};
pub use memory::{MemoryDataProvider, ProviderCall, ProviderOperation};
pub use record::{Identifier, Record};
pub use traits::{
    DataProvider, GetManyParams, GetManyResponse, GetOneParams, GetOneResponse, UpdateParams,
    UpdateResponse,
};

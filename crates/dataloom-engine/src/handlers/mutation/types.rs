//! Data types for the mutation controller.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dataloom_core::{CacheKey, Snapshot};
use dataloom_provider::{ProviderError, Record, UpdateParams};

/// How a mutation orders its cache write and its provider call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationMode {
    /// Call the provider first; write the cache only on success.
    #[default]
    Pessimistic,
    /// Write the cache now, call the provider in the background, roll back
    /// on failure.
    Optimistic,
    /// Write the cache now, call the provider only once confirmed, roll back
    /// on cancel or failure.
    Undoable,
}

impl MutationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationMode::Pessimistic => "pessimistic",
            MutationMode::Optimistic => "optimistic",
            MutationMode::Undoable => "undoable",
        }
    }

    /// Whether the cache is written before the provider answers.
    pub fn is_projected(&self) -> bool {
        !matches!(self, MutationMode::Pessimistic)
    }
}

impl fmt::Display for MutationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pessimistic" => Ok(MutationMode::Pessimistic),
            "optimistic" => Ok(MutationMode::Optimistic),
            "undoable" => Ok(MutationMode::Undoable),
            other => Err(format!(
                "unknown mutation mode '{other}', expected one of: pessimistic, optimistic, undoable"
            )),
        }
    }
}

/// Lifecycle of one mutation.
///
/// `Idle -> Pending -> {Confirmed | Cancelled} -> Settled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStatus {
    Idle,
    Pending,
    Confirmed,
    Cancelled,
    Settled,
}

impl MutationStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, MutationStatus::Settled)
    }
}

/// Opaque id of one mutation, used to address its undo signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationId(Uuid);

impl MutationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a mutation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The provider accepted the write; carries the authoritative record.
    Succeeded(Record),
    /// The provider rejected the write; the cache was rolled back.
    Failed(ProviderError),
    /// The undo signal cancelled the write before any call was made.
    Cancelled,
}

impl MutationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MutationOutcome::Succeeded(_) => "succeeded",
            MutationOutcome::Failed(_) => "failed",
            MutationOutcome::Cancelled => "cancelled",
        }
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            MutationOutcome::Succeeded(record) => Some(record),
            _ => None,
        }
    }
}

/// Everything one invocation needs to settle, owned by its task.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub id: MutationId,
    pub resource: String,
    pub params: UpdateParams,
    pub mode: MutationMode,
    /// The entry as it was before the mutation touched it.
    pub snapshot: Snapshot,
    /// Cache version of the projected write, if one was made.
    pub written_version: Option<u64>,
}

impl MutationRecord {
    pub fn key(&self) -> &CacheKey {
        &self.snapshot.key
    }
}

type SuccessFn = Box<dyn FnOnce(&Record) + Send>;
type ErrorFn = Box<dyn FnOnce(&ProviderError) + Send>;
type CancelFn = Box<dyn FnOnce() + Send>;

/// Per-invocation options. Exactly one callback fires, once, after the
/// mutation settles.
#[derive(Default)]
pub struct MutationOptions {
    pub mode: Option<MutationMode>,
    pub(crate) on_success: Option<SuccessFn>,
    pub(crate) on_error: Option<ErrorFn>,
    pub(crate) on_cancel: Option<CancelFn>,
}

impl fmt::Debug for MutationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationOptions")
            .field("mode", &self.mode)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the controller's default mode for this invocation.
    pub fn mode(mut self, mode: MutationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Record) + Send + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&ProviderError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn on_cancel<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_cancel = Some(Box::new(callback));
        self
    }
}

/// Configuration for the mutation controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationConfig {
    /// Mode used when an invocation does not pick one.
    pub default_mode: MutationMode,
    /// Undoable mutations left unanswered this long are confirmed.
    pub undo_timeout: Option<Duration>,
}

impl MutationConfig {
    pub fn with_default_mode(mut self, mode: MutationMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn with_undo_timeout(mut self, timeout: Duration) -> Self {
        self.undo_timeout = Some(timeout);
        self
    }
}

/// Errors from awaiting a mutation.
///
/// Provider rejections are not errors here; they settle the mutation as
/// [`MutationOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The task driving the mutation went away before it settled.
    #[error("mutation {id} was dropped before it settled")]
    Dropped { id: MutationId },
}

/// Result type for mutation operations.
pub type MutationResult<T> = Result<T, MutationError>;

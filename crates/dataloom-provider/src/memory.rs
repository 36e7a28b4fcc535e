//! In-memory provider implementation for testing.
//!
//! Records live in a `DashMap` of per-resource tables. Every call is
//! appended to a call log so tests can assert how often, and with which
//! parameters, the provider was reached. Failures can be injected per
//! operation, either once or permanently.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::error::{ProviderError, ProviderResult};
use crate::record::{Identifier, Record};
use crate::traits::{
    validate_resource, DataProvider, GetManyParams, GetManyResponse, UpdateParams, UpdateResponse,
};

/// Provider operations, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOperation {
    GetMany,
    Update,
}

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    GetMany {
        resource: String,
        ids: Vec<Identifier>,
    },
    Update {
        resource: String,
        id: Identifier,
        data: Map<String, Value>,
    },
}

impl ProviderCall {
    pub fn operation(&self) -> ProviderOperation {
        match self {
            ProviderCall::GetMany { .. } => ProviderOperation::GetMany,
            ProviderCall::Update { .. } => ProviderOperation::Update,
        }
    }
}

#[derive(Default)]
struct FailurePlan {
    once: HashMap<ProviderOperation, VecDeque<ProviderError>>,
    always: HashMap<ProviderOperation, ProviderError>,
}

impl FailurePlan {
    fn next(&mut self, operation: ProviderOperation) -> Option<ProviderError> {
        if let Some(err) = self.once.get_mut(&operation).and_then(VecDeque::pop_front) {
            return Some(err);
        }
        self.always.get(&operation).cloned()
    }
}

type UpdateTransform = Box<dyn Fn(&str, &mut Record) + Send + Sync>;

/// In-memory implementation of DataProvider.
///
/// # Performance Characteristics
///
/// - **get_many**: O(K) for K requested ids (hash lookups)
/// - **update**: O(1) average
///
/// Uses DashMap so the provider can be shared across tasks without an outer
/// lock.
#[derive(Default)]
pub struct MemoryDataProvider {
    records: DashMap<String, HashMap<Identifier, Record>>,
    calls: Mutex<Vec<ProviderCall>>,
    failures: Mutex<FailurePlan>,
    latency: Option<Duration>,
    update_transform: Option<UpdateTransform>,
}

impl fmt::Debug for MemoryDataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDataProvider")
            .field("resources", &self.records.len())
            .field("calls", &self.calls.lock().len())
            .field("latency", &self.latency)
            .finish()
    }
}

impl MemoryDataProvider {
    /// Creates a new empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new provider wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seeds a resource with records.
    pub fn with_records(self, resource: &str, records: impl IntoIterator<Item = Record>) -> Self {
        for record in records {
            self.insert(resource, record);
        }
        self
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Post-processes every updated record before it is stored and
    /// returned, the way a backend stamps server-side fields.
    pub fn with_update_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str, &mut Record) + Send + Sync + 'static,
    {
        self.update_transform = Some(Box::new(transform));
        self
    }

    /// Inserts or replaces a record.
    pub fn insert(&self, resource: &str, record: Record) {
        self.records
            .entry(resource.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Returns the stored record, bypassing the call log.
    pub fn record(&self, resource: &str, id: &Identifier) -> Option<Record> {
        self.records
            .get(resource)
            .and_then(|table| table.get(id).cloned())
    }

    /// Makes the next call of `operation` fail with `error`.
    pub fn fail_next(&self, operation: ProviderOperation, error: ProviderError) {
        self.failures
            .lock()
            .once
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Makes every call of `operation` fail with `error`.
    pub fn fail_always(&self, operation: ProviderOperation, error: ProviderError) {
        self.failures.lock().always.insert(operation, error);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        let mut failures = self.failures.lock();
        failures.once.clear();
        failures.always.clear();
    }

    /// Returns every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls of `operation`.
    pub fn call_count(&self, operation: ProviderOperation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Returns the id lists of every `get_many` call on `resource`.
    pub fn get_many_calls(&self, resource: &str) -> Vec<Vec<Identifier>> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ProviderCall::GetMany { resource: r, ids } if r == resource => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forgets the call log.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    async fn enter(&self, call: ProviderCall) -> ProviderResult<()> {
        let operation = call.operation();
        self.calls.lock().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.lock().next(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataProvider for MemoryDataProvider {
    #[instrument(skip(self, params), fields(resource = %resource, ids = params.ids.len()))]
    async fn get_many(
        &self,
        resource: &str,
        params: &GetManyParams,
    ) -> ProviderResult<GetManyResponse> {
        validate_resource(resource)?;
        self.enter(ProviderCall::GetMany {
            resource: resource.to_string(),
            ids: params.ids.clone(),
        })
        .await?;

        let data = self
            .records
            .get(resource)
            .map(|table| {
                params
                    .ids
                    .iter()
                    .filter_map(|id| table.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(GetManyResponse { data })
    }

    #[instrument(skip(self, params), fields(resource = %resource, id = %params.id))]
    async fn update(
        &self,
        resource: &str,
        params: &UpdateParams,
    ) -> ProviderResult<UpdateResponse> {
        validate_resource(resource)?;
        self.enter(ProviderCall::Update {
            resource: resource.to_string(),
            id: params.id.clone(),
            data: params.data.clone(),
        })
        .await?;

        let mut table = self
            .records
            .get_mut(resource)
            .ok_or_else(|| ProviderError::NotFound {
                resource: resource.to_string(),
                id: params.id.to_string(),
            })?;
        let current = table
            .get(&params.id)
            .ok_or_else(|| ProviderError::NotFound {
                resource: resource.to_string(),
                id: params.id.to_string(),
            })?;

        let mut next = current.merged(&params.data);
        if let Some(transform) = &self.update_transform {
            transform(resource, &mut next);
        }
        table.insert(next.id.clone(), next.clone());

        Ok(UpdateResponse { data: next })
    }
}

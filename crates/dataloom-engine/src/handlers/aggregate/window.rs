//! Per-resource accumulation buffer for one scheduling tick.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::time::Instant;

use dataloom_provider::{Identifier, ProviderError, Record};

use super::types::{AggregateError, IdSet};

/// What a caller receives once its window settles.
pub(crate) type Delivery = Result<Vec<Option<Record>>, AggregateError>;

/// One original request bound to a window.
pub(crate) struct CallerHandle {
    requested: Vec<Identifier>,
    sender: oneshot::Sender<Delivery>,
}

/// Ids and callers collected for one resource during one tick.
///
/// The window is the unit of dispatch: it turns into exactly one `get_many`
/// call, and settling it consumes it, so every caller is answered once.
pub struct CallBatchWindow {
    resource: String,
    ids: IdSet,
    callers: Vec<CallerHandle>,
    opened_at: Instant,
}

impl std::fmt::Debug for CallBatchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBatchWindow")
            .field("resource", &self.resource)
            .field("ids", &self.ids.as_slice())
            .field("callers", &self.callers.len())
            .finish()
    }
}

impl CallBatchWindow {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ids: IdSet::new(),
            callers: Vec::new(),
            opened_at: Instant::now(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The merged ids, in first-seen order.
    pub fn ids(&self) -> &IdSet {
        &self.ids
    }

    pub fn caller_count(&self) -> usize {
        self.callers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Binds a caller to this window and merges its ids.
    ///
    /// Returns the number of ids that were new to the window.
    pub(crate) fn register(
        &mut self,
        requested: IdSet,
        sender: oneshot::Sender<Delivery>,
    ) -> usize {
        let added = self.ids.merge(&requested);
        self.callers.push(CallerHandle {
            requested: requested.into_vec(),
            sender,
        });
        added
    }

    /// Fans the provider result out to every caller.
    ///
    /// Each caller receives its own ids in its own order. On error every
    /// caller receives the same error. Returns how many callers were still
    /// listening.
    pub(crate) fn settle(self, result: Result<Vec<Record>, ProviderError>) -> usize {
        match result {
            Ok(records) => {
                let by_id: HashMap<Identifier, Record> = records
                    .into_iter()
                    .map(|record| (record.id.clone(), record))
                    .collect();
                self.callers
                    .into_iter()
                    .map(|caller| {
                        let slice = caller
                            .requested
                            .iter()
                            .map(|id| by_id.get(id).cloned())
                            .collect();
                        caller.sender.send(Ok(slice)).is_ok()
                    })
                    .filter(|delivered| *delivered)
                    .count()
            }
            Err(err) => self
                .callers
                .into_iter()
                .map(|caller| {
                    caller
                        .sender
                        .send(Err(AggregateError::Provider(err.clone())))
                        .is_ok()
                })
                .filter(|delivered| *delivered)
                .count(),
        }
    }
}

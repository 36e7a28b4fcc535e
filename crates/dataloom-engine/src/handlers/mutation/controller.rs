//! Mutation controller implementation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{oneshot, watch};
use tracing::{debug, instrument, warn};

use dataloom_core::{CacheKey, RecordCache};
use dataloom_provider::{DataProvider, Record, UpdateParams};

use super::types::{
    MutationConfig, MutationError, MutationId, MutationMode, MutationOptions, MutationOutcome,
    MutationRecord, MutationResult, MutationStatus,
};
use super::undo::{UndoDecision, UndoHandle};

struct Inner<P: ?Sized> {
    provider: Arc<P>,
    cache: Arc<RecordCache>,
    config: MutationConfig,
    /// Undoable mutations still waiting for their decision.
    undoables: DashMap<MutationId, UndoHandle>,
    /// Number of mutations not yet settled.
    in_flight: Arc<watch::Sender<usize>>,
}

/// Orders the cache write, the provider call and the callbacks of every
/// update, and rolls the cache back when a write does not go through.
///
/// Each `update` gets its own task and its own undo signal; concurrent
/// mutations only meet in the cache, where version checks keep a rollback
/// from clobbering a newer write.
///
/// # Panics
///
/// `update` spawns the mutation task and must be called inside a tokio
/// runtime.
pub struct MutationController<P: DataProvider + ?Sized> {
    inner: Arc<Inner<P>>,
}

impl<P: DataProvider + ?Sized> Clone for MutationController<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: DataProvider + ?Sized> std::fmt::Debug for MutationController<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationController")
            .field("config", &self.inner.config)
            .field("mutating", &self.mutating_count())
            .field("pending_undoables", &self.inner.undoables.len())
            .finish()
    }
}

impl<P: DataProvider + ?Sized> MutationController<P> {
    pub fn new(provider: Arc<P>, cache: Arc<RecordCache>, config: MutationConfig) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                provider,
                cache,
                config,
                undoables: DashMap::new(),
                in_flight: Arc::new(in_flight),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.inner.cache
    }

    pub fn config(&self) -> &MutationConfig {
        &self.inner.config
    }

    /// Starts an update of `params.id` in `resource`.
    ///
    /// Returns as soon as the mutation is pending. For optimistic and
    /// undoable modes the projected record is already in the cache when
    /// this returns.
    pub fn update(
        &self,
        resource: &str,
        params: UpdateParams,
        options: MutationOptions,
    ) -> UpdateHandle {
        let mode = options.mode.unwrap_or(self.inner.config.default_mode);
        let id = MutationId::new();
        let key = CacheKey::new(resource, params.id.clone());
        let guard = InFlightGuard::new(Arc::clone(&self.inner.in_flight));
        let (status, status_receiver) = watch::channel(MutationStatus::Idle);

        let snapshot = self.inner.cache.snapshot(&key);
        status.send_replace(MutationStatus::Pending);

        let written_version = if mode.is_projected() {
            let base = snapshot
                .record()
                .cloned()
                .or_else(|| params.previous_data.clone())
                .unwrap_or_else(|| Record::new(params.id.clone()));
            let projected = base.merged(&params.data);
            Some(self.inner.cache.insert(key, projected))
        } else {
            None
        };

        let (undo, decision) = if mode == MutationMode::Undoable {
            let (handle, receiver) = UndoHandle::channel(id);
            self.inner.undoables.insert(id, handle.clone());
            (Some(handle), Some(receiver))
        } else {
            (None, None)
        };

        debug!(
            mutation = %id,
            resource = %resource,
            record = %params.id,
            mode = %mode,
            "mutation pending"
        );

        let record = MutationRecord {
            id,
            resource: resource.to_string(),
            params,
            mode,
            snapshot,
            written_version,
        };
        let (outcome_sender, outcome) = oneshot::channel();
        let controller = self.clone();
        tokio::spawn(async move {
            controller
                .run(record, options, decision, status, outcome_sender, guard)
                .await;
        });

        UpdateHandle {
            id,
            mode,
            status: status_receiver,
            undo,
            outcome,
        }
    }

    /// True while any mutation has not settled.
    pub fn is_loading(&self) -> bool {
        self.mutating_count() > 0
    }

    /// Number of mutations not yet settled.
    pub fn mutating_count(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    /// Waits until every mutation has settled.
    pub async fn idle(&self) {
        let mut receiver = self.inner.in_flight.subscribe();
        let _ = receiver.wait_for(|count| *count == 0).await;
    }

    /// Ids of undoable mutations still waiting for a decision.
    pub fn pending_undoables(&self) -> Vec<MutationId> {
        self.inner
            .undoables
            .iter()
            .map(|entry| *entry.key())
            .collect()
    }

    /// The undo signal of a pending undoable mutation.
    pub fn undo_handle(&self, id: MutationId) -> Option<UndoHandle> {
        self.inner
            .undoables
            .get(&id)
            .map(|entry| entry.value().clone())
    }

    /// Answers a pending undoable mutation by id.
    ///
    /// Returns `false` when the id is unknown or was already answered.
    pub fn resolve_undoable(&self, id: MutationId, is_undo: bool) -> bool {
        self.undo_handle(id)
            .map(|handle| handle.emit(is_undo))
            .unwrap_or(false)
    }

    /// Confirms every pending undoable mutation. Returns how many were
    /// confirmed by this call.
    pub fn confirm_all(&self) -> usize {
        let handles: Vec<UndoHandle> = self
            .inner
            .undoables
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        handles.iter().filter(|handle| handle.confirm()).count()
    }

    #[instrument(
        skip_all,
        fields(mutation = %record.id, resource = %record.resource, mode = %record.mode)
    )]
    async fn run(
        self,
        record: MutationRecord,
        options: MutationOptions,
        decision: Option<oneshot::Receiver<UndoDecision>>,
        status: watch::Sender<MutationStatus>,
        outcome_sender: oneshot::Sender<MutationOutcome>,
        guard: InFlightGuard,
    ) {
        let MutationOptions {
            on_success,
            on_error,
            on_cancel,
            ..
        } = options;

        if let Some(decision) = decision {
            let decision = self.await_decision(decision).await;
            self.inner.undoables.remove(&record.id);
            if decision == UndoDecision::Undo {
                status.send_replace(MutationStatus::Cancelled);
                self.rollback(&record);
                self.finish(&record, &MutationOutcome::Cancelled, &status, guard);
                if let Some(callback) = on_cancel {
                    callback();
                }
                let _ = outcome_sender.send(MutationOutcome::Cancelled);
                return;
            }
        }

        status.send_replace(MutationStatus::Confirmed);
        let outcome = match self
            .inner
            .provider
            .update(&record.resource, &record.params)
            .await
        {
            Ok(response) => {
                self.reconcile(&record, response.data.clone());
                MutationOutcome::Succeeded(response.data)
            }
            Err(err) => {
                warn!(error = %err, "update failed, rolling back");
                self.rollback(&record);
                MutationOutcome::Failed(err)
            }
        };
        self.finish(&record, &outcome, &status, guard);

        match &outcome {
            MutationOutcome::Succeeded(data) => {
                if let Some(callback) = on_success {
                    callback(data);
                }
            }
            MutationOutcome::Failed(err) => {
                if let Some(callback) = on_error {
                    callback(err);
                }
            }
            MutationOutcome::Cancelled => {}
        }
        let _ = outcome_sender.send(outcome);
    }

    /// Waits for the undo signal, confirming on timeout.
    async fn await_decision(&self, decision: oneshot::Receiver<UndoDecision>) -> UndoDecision {
        match self.inner.config.undo_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, decision).await {
                Ok(received) => received.unwrap_or(UndoDecision::Confirm),
                Err(_) => {
                    debug!(
                        timeout_ms = timeout.as_millis() as u64,
                        "undo window elapsed, confirming"
                    );
                    UndoDecision::Confirm
                }
            },
            None => decision.await.unwrap_or(UndoDecision::Confirm),
        }
    }

    /// Restores the snapshot unless a later write superseded ours.
    ///
    /// On a conflict the newer value stays but is invalidated: it may have
    /// been projected on top of our rejected write, and a later restore of
    /// its own snapshot would bring that write back.
    fn rollback(&self, record: &MutationRecord) {
        let Some(version) = record.written_version else {
            return;
        };
        if let Err(err) = self.inner.cache.restore(&record.snapshot, version) {
            warn!(error = %err, "rollback conflict, keeping the newer value");
            self.inner.cache.invalidate(record.key());
        }
    }

    /// Writes the authoritative record.
    ///
    /// A projected entry that a later write superseded is invalidated
    /// instead, so the next read refetches it.
    fn reconcile(&self, record: &MutationRecord, authoritative: Record) {
        let key = record.key().clone();
        match record.written_version {
            Some(version) => {
                if let Err(err) = self
                    .inner
                    .cache
                    .replace_if_version(key.clone(), authoritative, version)
                {
                    debug!(error = %err, "projected entry superseded, invalidating");
                    self.inner.cache.invalidate(&key);
                }
            }
            None => {
                self.inner.cache.insert(key, authoritative);
            }
        }
    }

    fn finish(
        &self,
        record: &MutationRecord,
        outcome: &MutationOutcome,
        status: &watch::Sender<MutationStatus>,
        guard: InFlightGuard,
    ) {
        metrics::counter!(
            "dataloom_mutations_total",
            "mode" => record.mode.as_str(),
            "outcome" => outcome.label()
        )
        .increment(1);
        status.send_replace(MutationStatus::Settled);
        drop(guard);
        debug!(outcome = outcome.label(), "mutation settled");
    }
}

/// Counts a mutation as in flight for as long as it lives.
///
/// Dropping the guard (including when the task is cancelled) decrements the
/// count.
struct InFlightGuard {
    counter: Arc<watch::Sender<usize>>,
}

impl InFlightGuard {
    fn new(counter: Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|count| *count += 1);
        Self { counter }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// The caller's view of one mutation.
#[derive(Debug)]
pub struct UpdateHandle {
    id: MutationId,
    mode: MutationMode,
    status: watch::Receiver<MutationStatus>,
    undo: Option<UndoHandle>,
    outcome: oneshot::Receiver<MutationOutcome>,
}

impl UpdateHandle {
    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn mode(&self) -> MutationMode {
        self.mode
    }

    /// The current lifecycle state.
    pub fn status(&self) -> MutationStatus {
        *self.status.borrow()
    }

    /// Receives every lifecycle transition.
    pub fn status_receiver(&self) -> watch::Receiver<MutationStatus> {
        self.status.clone()
    }

    /// The undo signal; `Some` for undoable mutations only.
    pub fn undo(&self) -> Option<&UndoHandle> {
        self.undo.as_ref()
    }

    /// Confirms an undoable mutation. `false` for other modes or when
    /// already answered.
    pub fn confirm(&self) -> bool {
        self.undo.as_ref().is_some_and(UndoHandle::confirm)
    }

    /// Cancels an undoable mutation. `false` for other modes or when
    /// already answered.
    pub fn cancel(&self) -> bool {
        self.undo.as_ref().is_some_and(UndoHandle::cancel)
    }

    /// Waits for the mutation to settle.
    pub async fn settled(self) -> MutationResult<MutationOutcome> {
        let id = self.id;
        self.outcome
            .await
            .map_err(|_| MutationError::Dropped { id })
    }
}

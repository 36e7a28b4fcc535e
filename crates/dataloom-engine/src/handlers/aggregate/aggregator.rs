//! Request aggregator implementation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use dataloom_core::{CacheKey, RecordCache};
use dataloom_provider::{DataProvider, GetManyParams, Identifier};

use super::types::{
    AggregateError, AggregateResult, AggregatorConfig, IdSet, ReadResult, RequestOptions,
};
use super::window::{CallBatchWindow, Delivery};

/// A window still accepting callers, tagged with the flush that owns it.
struct Accumulating {
    generation: u64,
    window: CallBatchWindow,
}

struct Inner<P: ?Sized> {
    provider: Arc<P>,
    cache: Arc<RecordCache>,
    config: AggregatorConfig,
    windows: Mutex<HashMap<String, Accumulating>>,
    next_generation: AtomicU64,
}

/// Batches concurrent read-by-id requests into one provider call per
/// resource per tick.
///
/// Two-stage flow:
/// 1. Registration: synchronous. The caller's ids are merged into the
///    resource's accumulating window; the first registration of a window
///    schedules its flush.
/// 2. Flush: after one yield (or `batch_window`), the window is detached
///    and a single `get_many` is issued with the union of ids. The result
///    is written into the cache and sliced back to each caller.
///
/// Cloning is cheap; clones share the same windows.
pub struct RequestAggregator<P: DataProvider + ?Sized> {
    inner: Arc<Inner<P>>,
}

impl<P: DataProvider + ?Sized> Clone for RequestAggregator<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: DataProvider + ?Sized> std::fmt::Debug for RequestAggregator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAggregator")
            .field("config", &self.inner.config)
            .field("pending_windows", &self.pending_windows())
            .finish()
    }
}

impl<P: DataProvider + ?Sized> RequestAggregator<P> {
    /// Creates a new aggregator writing into `cache`.
    pub fn new(provider: Arc<P>, cache: Arc<RecordCache>, config: AggregatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                cache,
                config,
                windows: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the cache results are written into.
    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.inner.cache
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.inner.config
    }

    /// Registers interest in `ids` of `resource`.
    pub fn request(&self, resource: &str, ids: &[Identifier]) -> PendingRead {
        self.request_with(resource, ids, RequestOptions::default())
    }

    /// Registers interest in `ids` of `resource` with explicit options.
    ///
    /// An empty id list or a disabled request does not touch any window and
    /// resolves to [`ReadResult::NotFetched`].
    ///
    /// When called outside a tokio runtime no flush can be scheduled; the
    /// window then waits for an explicit [`flush`](Self::flush).
    pub fn request_with(
        &self,
        resource: &str,
        ids: &[Identifier],
        options: RequestOptions,
    ) -> PendingRead {
        let requested = IdSet::from_ids(ids.iter().cloned());
        if !options.enabled || requested.is_empty() {
            return PendingRead::not_fetched();
        }

        let (sender, receiver) = oneshot::channel();
        let opened = {
            let mut windows = self.inner.windows.lock();
            match windows.entry(resource.to_string()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().window.register(requested, sender);
                    None
                }
                Entry::Vacant(entry) => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                    let mut window = CallBatchWindow::new(resource);
                    window.register(requested, sender);
                    entry.insert(Accumulating { generation, window });
                    Some(generation)
                }
            }
        };

        if let Some(generation) = opened {
            self.schedule_flush(resource, generation);
        }
        PendingRead::waiting(resource, receiver)
    }

    /// Dispatches every accumulating window now, without waiting for the
    /// tick boundary. Returns the number of windows dispatched.
    pub async fn flush(&self) -> usize {
        let windows: Vec<CallBatchWindow> = self
            .inner
            .windows
            .lock()
            .drain()
            .map(|(_, accumulating)| accumulating.window)
            .collect();
        let count = windows.len();
        join_all(windows.into_iter().map(|window| self.execute(window))).await;
        count
    }

    /// Number of windows still accepting callers.
    pub fn pending_windows(&self) -> usize {
        self.inner.windows.lock().len()
    }

    /// The merged ids of the accumulating window for `resource`.
    pub fn pending_ids(&self, resource: &str) -> Option<Vec<Identifier>> {
        self.inner
            .windows
            .lock()
            .get(resource)
            .map(|accumulating| accumulating.window.ids().as_slice().to_vec())
    }

    fn schedule_flush(&self, resource: &str, generation: u64) {
        let Ok(handle) = Handle::try_current() else {
            debug!(resource = %resource, "no runtime, window waits for an explicit flush");
            return;
        };

        let aggregator = self.clone();
        let resource = resource.to_string();
        let batch_window = self.inner.config.batch_window;
        handle.spawn(async move {
            if batch_window.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(batch_window).await;
            }
            if let Some(window) = aggregator.detach(&resource, generation) {
                aggregator.execute(window).await;
            }
        });
    }

    /// Removes the window owned by `generation`, leaving any newer one alone.
    fn detach(&self, resource: &str, generation: u64) -> Option<CallBatchWindow> {
        let mut windows = self.inner.windows.lock();
        match windows.get(resource) {
            Some(accumulating) if accumulating.generation == generation => {
                windows.remove(resource).map(|accumulating| accumulating.window)
            }
            _ => None,
        }
    }

    async fn execute(&self, window: CallBatchWindow) {
        let resource = window.resource().to_string();
        let params = GetManyParams {
            ids: window.ids().as_slice().to_vec(),
        };
        let keys: Vec<CacheKey> = params
            .ids
            .iter()
            .map(|id| CacheKey::new(resource.as_str(), id.clone()))
            .collect();

        metrics::counter!("dataloom_batches_dispatched_total").increment(1);
        metrics::counter!("dataloom_batch_ids_total").increment(params.ids.len() as u64);
        debug!(
            resource = %resource,
            ids = params.ids.len(),
            callers = window.caller_count(),
            waited_ms = window.opened_at().elapsed().as_millis() as u64,
            "dispatching batched get_many"
        );

        let fetch_guard = FetchGuard::new(&self.inner.cache, keys);
        let result = self
            .inner
            .provider
            .get_many(&resource, &params)
            .await
            .map(|response| response.data);

        match &result {
            Ok(records) => {
                for record in records.iter().filter(|r| window.ids().contains(&r.id)) {
                    let key = CacheKey::new(resource.as_str(), record.id.clone());
                    self.inner.cache.insert(key, record.clone());
                }
            }
            Err(err) => {
                warn!(resource = %resource, error = %err, "batched get_many failed");
            }
        }
        drop(fetch_guard);

        let delivered = window.settle(result);
        debug!(resource = %resource, delivered, "batch settled");
    }
}

/// Holds the fetching flags of a window's keys while its call is in flight.
///
/// Dropping the guard clears the flags, including when the flush task is
/// cancelled mid-call.
struct FetchGuard<'a> {
    cache: &'a RecordCache,
    keys: Vec<CacheKey>,
}

impl<'a> FetchGuard<'a> {
    fn new(cache: &'a RecordCache, keys: Vec<CacheKey>) -> Self {
        cache.begin_fetch(&keys);
        Self { cache, keys }
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.cache.end_fetch(&self.keys);
    }
}

enum PendingState {
    NotFetched,
    Waiting {
        resource: String,
        receiver: oneshot::Receiver<Delivery>,
    },
}

/// The eventual result of one aggregated request.
///
/// Dropping it only discards this caller's delivery; the shared call still
/// runs for everyone else in the window.
pub struct PendingRead {
    state: PendingState,
}

impl std::fmt::Debug for PendingRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.state {
            PendingState::NotFetched => f.write_str("PendingRead::NotFetched"),
            PendingState::Waiting { resource, .. } => f
                .debug_struct("PendingRead::Waiting")
                .field("resource", resource)
                .finish(),
        }
    }
}

impl PendingRead {
    fn not_fetched() -> Self {
        Self {
            state: PendingState::NotFetched,
        }
    }

    fn waiting(resource: &str, receiver: oneshot::Receiver<Delivery>) -> Self {
        Self {
            state: PendingState::Waiting {
                resource: resource.to_string(),
                receiver,
            },
        }
    }

    /// Whether this request joined a window.
    pub fn is_batched(&self) -> bool {
        matches!(self.state, PendingState::Waiting { .. })
    }
}

impl Future for PendingRead {
    type Output = AggregateResult<ReadResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::NotFetched => Poll::Ready(Ok(ReadResult::NotFetched)),
            PendingState::Waiting { resource, receiver } => match Pin::new(receiver).poll(cx) {
                Poll::Ready(Ok(delivery)) => Poll::Ready(delivery.map(ReadResult::Fetched)),
                Poll::Ready(Err(_)) => Poll::Ready(Err(AggregateError::BatchDropped {
                    resource: resource.clone(),
                })),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// Registers aggregator metrics descriptions.
///
/// # Metrics Registered
///
/// - `dataloom_batches_dispatched_total` - Provider calls issued for windows
/// - `dataloom_batch_ids_total` - Ids requested across all dispatched windows
pub fn register_aggregator_metrics() {
    metrics::describe_counter!(
        "dataloom_batches_dispatched_total",
        "Total number of batched get_many calls issued"
    );
    metrics::describe_counter!(
        "dataloom_batch_ids_total",
        "Total number of ids requested by batched get_many calls"
    );
}

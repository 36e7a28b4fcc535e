//! Caller-facing read observer over the request aggregator.
//!
//! A [`GetManyQuery`] stands for one UI caller. Each `observe` is a render:
//! it reports the current [`QueryState`] and issues a request only when the
//! parameters changed since the previous render.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use dataloom_core::CacheKey;
use dataloom_provider::{DataProvider, Identifier, Record};

use super::aggregator::RequestAggregator;
use super::types::{AggregateError, ReadResult};

/// Called with the fetched records once the shared call succeeds.
pub type SuccessCallback = Arc<dyn Fn(&[Option<Record>]) + Send + Sync>;

/// Called with the error once the shared call fails.
pub type ErrorCallback = Arc<dyn Fn(&AggregateError) + Send + Sync>;

/// Options for one observation.
#[derive(Clone)]
pub struct QueryOptions {
    pub enabled: bool,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            on_success: None,
            on_error: None,
        }
    }
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("enabled", &self.enabled)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[Option<Record>]) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AggregateError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }
}

/// What a caller renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    /// One slot per requested id, in requested order.
    pub data: Option<Vec<Option<Record>>>,
    /// True only while no value exists and a request is outstanding.
    pub is_loading: bool,
    /// True while a request for this observer is outstanding.
    pub is_fetching: bool,
    /// Set only when a request was rejected.
    pub error: Option<AggregateError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryParams {
    resource: String,
    ids: Vec<Identifier>,
    enabled: bool,
}

struct Shared {
    state: watch::Sender<QueryState>,
    generation: AtomicU64,
}

/// Read observer for one caller.
///
/// # Panics
///
/// Issuing a request spawns a task, so `observe` and `refetch` must run
/// inside a tokio runtime.
pub struct GetManyQuery<P: DataProvider + ?Sized> {
    aggregator: RequestAggregator<P>,
    stale_time: Duration,
    params: Mutex<Option<QueryParams>>,
    options: Mutex<QueryOptions>,
    shared: Arc<Shared>,
}

impl<P: DataProvider + ?Sized> std::fmt::Debug for GetManyQuery<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetManyQuery")
            .field("params", &*self.params.lock())
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

impl<P: DataProvider + ?Sized> GetManyQuery<P> {
    /// Creates an observer that has not rendered yet.
    ///
    /// Cached entries younger than `stale_time` are served without a
    /// refetch; with a zero `stale_time` every mount refetches.
    pub fn new(aggregator: RequestAggregator<P>, stale_time: Duration) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            aggregator,
            stale_time,
            params: Mutex::new(None),
            options: Mutex::new(QueryOptions::default()),
            shared: Arc::new(Shared {
                state,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Renders with `resource`/`ids` and returns the state to display.
    ///
    /// A request is issued on the first render and whenever the resource,
    /// the ids (order included) or `enabled` change. Otherwise the state is
    /// refreshed from the cache and returned.
    pub fn observe(
        &self,
        resource: &str,
        ids: &[Identifier],
        options: QueryOptions,
    ) -> QueryState {
        let params = QueryParams {
            resource: resource.to_string(),
            ids: ids.to_vec(),
            enabled: options.enabled,
        };
        *self.options.lock() = options.clone();

        let changed = {
            let mut current = self.params.lock();
            if current.as_ref() == Some(&params) {
                false
            } else {
                *current = Some(params.clone());
                true
            }
        };

        if changed {
            self.issue(&params, options, false);
        } else {
            self.refresh_from_cache(&params);
        }
        self.state()
    }

    /// Re-issues the current request regardless of freshness.
    ///
    /// Does nothing before the first render or while disabled.
    pub fn refetch(&self) {
        let params = self.params.lock().clone();
        if let Some(params) = params {
            let options = self.options.lock().clone();
            self.issue(&params, options, true);
        }
    }

    /// The current state.
    pub fn state(&self) -> QueryState {
        self.shared.state.borrow().clone()
    }

    /// Receives every state change.
    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.shared.state.subscribe()
    }

    /// Waits until no request is outstanding and returns that state.
    pub async fn settled(&self) -> QueryState {
        let mut receiver = self.subscribe();
        let state = match receiver.wait_for(|state| !state.is_fetching).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.state(),
        };
        state
    }

    fn issue(&self, params: &QueryParams, options: QueryOptions, force: bool) {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cache = self.aggregator.cache();
        let cached = cache.get_many(&params.resource, &params.ids);
        let data = if !params.ids.is_empty() && cached.iter().all(Option::is_some) {
            Some(cached)
        } else {
            None
        };

        if !params.enabled || params.ids.is_empty() {
            self.shared.state.send_modify(|state| {
                state.data = data;
                state.is_loading = false;
                state.is_fetching = false;
                state.error = None;
            });
            return;
        }

        let stale = params.ids.iter().any(|id| {
            let key = CacheKey::new(params.resource.as_str(), id.clone());
            cache.is_stale(&key, self.stale_time)
        });
        if data.is_some() && !stale && !force {
            debug!(resource = %params.resource, "serving fresh cached records");
            self.shared.state.send_modify(|state| {
                state.data = data;
                state.is_loading = false;
                state.is_fetching = false;
                state.error = None;
            });
            return;
        }

        self.shared.state.send_modify(|state| {
            if !force {
                state.error = None;
            }
            if data.is_some() {
                state.data = data;
            } else if !force {
                state.data = None;
            }
            state.is_loading = state.data.is_none();
            state.is_fetching = true;
        });

        let pending = self.aggregator.request(&params.resource, &params.ids);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let result = pending.await;
            let current = shared.state.send_if_modified(|state| {
                if shared.generation.load(Ordering::Acquire) != generation {
                    return false;
                }
                match &result {
                    Ok(ReadResult::Fetched(records)) => {
                        state.data = Some(records.clone());
                        state.error = None;
                    }
                    Ok(ReadResult::NotFetched) => {}
                    Err(err) => state.error = Some(err.clone()),
                }
                state.is_loading = false;
                state.is_fetching = false;
                true
            });
            if !current {
                debug!(generation, "discarding response for superseded parameters");
                return;
            }
            match &result {
                Ok(ReadResult::Fetched(records)) => {
                    if let Some(callback) = &options.on_success {
                        callback(records);
                    }
                }
                Ok(ReadResult::NotFetched) => {}
                Err(err) => {
                    if let Some(callback) = &options.on_error {
                        callback(err);
                    }
                }
            }
        });
    }

    /// Picks up cache writes made since the last render, such as optimistic
    /// mutations, while no request is outstanding.
    fn refresh_from_cache(&self, params: &QueryParams) {
        if !params.enabled || params.ids.is_empty() {
            return;
        }
        let cached = self
            .aggregator
            .cache()
            .get_many(&params.resource, &params.ids);
        if cached.iter().all(Option::is_some) {
            self.shared.state.send_if_modified(|state| {
                if state.is_fetching || state.data.as_ref() == Some(&cached) {
                    return false;
                }
                state.data = Some(cached);
                true
            });
        }
    }
}

impl<P: DataProvider + ?Sized> Drop for GetManyQuery<P> {
    fn drop(&mut self) {
        // Unmounted observers ignore late responses.
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
    }
}

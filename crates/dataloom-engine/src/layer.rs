//! Wires the cache, the aggregator and the mutation controller together.

use std::sync::Arc;
use std::time::Duration;

use dataloom_core::{RecordCache, RecordCacheConfig};
use dataloom_provider::DataProvider;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::handlers::aggregate::{AggregatorConfig, GetManyQuery, RequestAggregator};
use crate::handlers::mutation::{MutationConfig, MutationController};

/// One record cache shared by reads and writes over one provider.
///
/// Queries created from the same layer batch together and see the
/// projections of its mutations.
pub struct DataLayer<P: DataProvider + ?Sized> {
    cache: Arc<RecordCache>,
    aggregator: RequestAggregator<P>,
    mutations: MutationController<P>,
    stale_time: Duration,
}

impl<P: DataProvider + ?Sized> Clone for DataLayer<P> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            aggregator: self.aggregator.clone(),
            mutations: self.mutations.clone(),
            stale_time: self.stale_time,
        }
    }
}

impl<P: DataProvider + ?Sized> std::fmt::Debug for DataLayer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayer")
            .field("aggregator", &self.aggregator)
            .field("mutations", &self.mutations)
            .field("stale_time", &self.stale_time)
            .finish()
    }
}

impl<P: DataProvider + ?Sized> DataLayer<P> {
    pub fn new(
        provider: Arc<P>,
        cache_config: RecordCacheConfig,
        aggregator_config: AggregatorConfig,
        mutation_config: MutationConfig,
        stale_time: Duration,
    ) -> Self {
        let cache = Arc::new(RecordCache::new(cache_config));
        let aggregator =
            RequestAggregator::new(Arc::clone(&provider), Arc::clone(&cache), aggregator_config);
        let mutations = MutationController::new(provider, Arc::clone(&cache), mutation_config);
        Self {
            cache,
            aggregator,
            mutations,
            stale_time,
        }
    }

    /// Builds a layer from a loaded configuration.
    ///
    /// The configuration is validated again, so a hand-built `EngineConfig`
    /// with an unknown mode or a zero capacity is rejected here.
    pub fn from_config(provider: Arc<P>, config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self::new(
            provider,
            config.cache_config(),
            config.aggregator_config(),
            config.mutation_config()?,
            config.stale_time(),
        ))
    }

    /// A new read observer sharing this layer's aggregator and cache.
    pub fn get_many_query(&self) -> GetManyQuery<P> {
        GetManyQuery::new(self.aggregator.clone(), self.stale_time)
    }

    pub fn aggregator(&self) -> &RequestAggregator<P> {
        &self.aggregator
    }

    pub fn mutations(&self) -> &MutationController<P> {
        &self.mutations
    }

    pub fn cache(&self) -> &Arc<RecordCache> {
        &self.cache
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }
}

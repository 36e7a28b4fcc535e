//! Tests for request aggregation and the read observer.

use super::*;
use dataloom_core::{CacheKey, RecordCache};
use dataloom_provider::{Identifier, MemoryDataProvider, ProviderError, ProviderOperation, Record};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================
// Test Helpers
// ============================================================

fn ids(values: &[i64]) -> Vec<Identifier> {
    values.iter().map(|&v| Identifier::Int(v)).collect()
}

fn post(id: i64) -> Record {
    Record::new(id).with_field("title", format!("post {id}"))
}

fn create_provider() -> Arc<MemoryDataProvider> {
    Arc::new(
        MemoryDataProvider::new()
            .with_records("posts", (1..=6).map(post))
            .with_records("comments", (1..=3).map(post)),
    )
}

fn create_aggregator(provider: &Arc<MemoryDataProvider>) -> RequestAggregator<MemoryDataProvider> {
    RequestAggregator::new(
        Arc::clone(provider),
        Arc::new(RecordCache::default()),
        AggregatorConfig::default(),
    )
}

fn create_query(
    aggregator: &RequestAggregator<MemoryDataProvider>,
) -> GetManyQuery<MemoryDataProvider> {
    GetManyQuery::new(aggregator.clone(), Duration::ZERO)
}

fn fetched(result: AggregateResult<ReadResult>) -> Vec<Option<Record>> {
    result
        .unwrap()
        .into_records()
        .expect("request should have been fetched")
}

// ============================================================
// Section 1: Aggregation Within One Tick
// ============================================================

#[tokio::test]
async fn test_requests_in_one_tick_share_one_call() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    // Act
    let first = aggregator.request("posts", &ids(&[1, 2]));
    let second = aggregator.request("posts", &ids(&[2, 3]));
    let third = aggregator.request("posts", &ids(&[3, 4]));
    let (first, second, third) = tokio::join!(first, second, third);

    // Assert - one call with the union, each id once, first-seen order
    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1, 2, 3, 4])]);
    assert_eq!(fetched(first), vec![Some(post(1)), Some(post(2))]);
    assert_eq!(fetched(second), vec![Some(post(2)), Some(post(3))]);
    assert_eq!(fetched(third), vec![Some(post(3)), Some(post(4))]);
}

#[tokio::test]
async fn test_distinct_resources_get_separate_calls() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    // Act
    let posts = aggregator.request("posts", &ids(&[1, 2]));
    let comments = aggregator.request("comments", &ids(&[1]));
    let (posts, comments) = tokio::join!(posts, comments);

    // Assert
    assert!(posts.is_ok() && comments.is_ok());
    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1, 2])]);
    assert_eq!(provider.get_many_calls("comments"), vec![ids(&[1])]);
    assert_eq!(provider.call_count(ProviderOperation::GetMany), 2);
}

#[tokio::test]
async fn test_subset_caller_receives_only_its_records_in_its_order() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    // Act
    let wide = aggregator.request("posts", &ids(&[1, 2, 3, 4]));
    let narrow = aggregator.request("posts", &ids(&[4, 2]));
    let (_, narrow) = tokio::join!(wide, narrow);

    // Assert
    assert_eq!(fetched(narrow), vec![Some(post(4)), Some(post(2))]);
}

#[tokio::test]
async fn test_missing_ids_resolve_to_none_at_their_position() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    let result = aggregator.request("posts", &ids(&[1, 42, 2])).await;

    assert_eq!(fetched(result), vec![Some(post(1)), None, Some(post(2))]);
}

#[tokio::test]
async fn test_duplicate_ids_within_one_caller_are_requested_once() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    let result = aggregator.request("posts", &ids(&[2, 2, 1])).await;

    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[2, 1])]);
    assert_eq!(fetched(result), vec![Some(post(2)), Some(post(1))]);
}

// ============================================================
// Section 2: Skipped Requests
// ============================================================

#[tokio::test]
async fn test_empty_request_is_not_fetched_and_calls_nothing() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    // Act
    let pending = aggregator.request("posts", &[]);
    let batched = pending.is_batched();
    let result = pending.await;

    // Assert
    assert!(!batched);
    assert_eq!(result, Ok(ReadResult::NotFetched));
    assert_eq!(aggregator.pending_windows(), 0);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_disabled_request_is_not_fetched_and_calls_nothing() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    let result = aggregator
        .request_with("posts", &ids(&[1]), RequestOptions { enabled: false })
        .await;

    assert_eq!(result, Ok(ReadResult::NotFetched));
    assert!(provider.calls().is_empty());
}

// ============================================================
// Section 3: Failures
// ============================================================

#[tokio::test]
async fn test_failure_reaches_every_caller_of_the_window() {
    // Arrange
    let provider = create_provider();
    provider.fail_next(ProviderOperation::GetMany, ProviderError::rejected("failed"));
    let aggregator = create_aggregator(&provider);

    // Act
    let first = aggregator.request("posts", &ids(&[1]));
    let second = aggregator.request("posts", &ids(&[2]));
    let (first, second) = tokio::join!(first, second);

    // Assert
    let expected = AggregateError::Provider(ProviderError::rejected("failed"));
    assert_eq!(first, Err(expected.clone()));
    assert_eq!(second, Err(expected));
    assert_eq!(provider.call_count(ProviderOperation::GetMany), 1);
}

#[test]
fn test_dropped_window_reports_batch_dropped() {
    // Arrange - outside a runtime nothing flushes the window
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let pending = aggregator.request("posts", &ids(&[1]));

    // Act
    drop(aggregator);
    let result = futures::executor::block_on(pending);

    // Assert
    assert_eq!(
        result,
        Err(AggregateError::BatchDropped {
            resource: "posts".to_string()
        })
    );
    assert!(provider.calls().is_empty());
}

// ============================================================
// Section 4: Window Lifecycle
// ============================================================

#[tokio::test(start_paused = true)]
async fn test_request_during_in_flight_call_opens_new_window() {
    // Arrange
    let provider = Arc::new(
        MemoryDataProvider::new()
            .with_records("posts", (1..=3).map(post))
            .with_latency(Duration::from_millis(100)),
    );
    let aggregator = create_aggregator(&provider);
    let first = tokio::spawn(aggregator.request("posts", &ids(&[1])));

    // Act - let the first window dispatch, then ask again mid-flight
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(aggregator.pending_windows(), 0);
    assert!(aggregator.cache().is_fetching(&CacheKey::new("posts", 1)));
    let second = aggregator.request("posts", &ids(&[1, 2]));
    assert_eq!(aggregator.pending_ids("posts"), Some(ids(&[1, 2])));

    let first = first.await.unwrap();
    let second = second.await;

    // Assert
    assert!(first.is_ok() && second.is_ok());
    assert_eq!(
        provider.get_many_calls("posts"),
        vec![ids(&[1]), ids(&[1, 2])]
    );
}

#[tokio::test]
async fn test_explicit_flush_dispatches_immediately_and_once() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let pending = aggregator.request("posts", &ids(&[1, 2]));

    // Act
    let dispatched = aggregator.flush().await;
    let result = pending.await;
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }

    // Assert - the scheduled flush found nothing left to send
    assert_eq!(dispatched, 1);
    assert!(result.is_ok());
    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1, 2])]);
}

#[test]
fn test_flush_without_scheduler_drains_windows() {
    // Arrange - registered outside a runtime
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let posts = aggregator.request("posts", &ids(&[1]));
    let comments = aggregator.request("comments", &ids(&[2]));
    assert_eq!(aggregator.pending_windows(), 2);

    // Act
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (dispatched, posts, comments) = runtime.block_on(async {
        let dispatched = aggregator.flush().await;
        (dispatched, posts.await, comments.await)
    });

    // Assert
    assert_eq!(dispatched, 2);
    assert_eq!(fetched(posts), vec![Some(post(1))]);
    assert_eq!(fetched(comments), vec![Some(post(2))]);
}

#[tokio::test(start_paused = true)]
async fn test_batch_window_widens_accumulation() {
    // Arrange
    let provider = create_provider();
    let aggregator = RequestAggregator::new(
        Arc::clone(&provider),
        Arc::new(RecordCache::default()),
        AggregatorConfig::default().with_batch_window(Duration::from_millis(50)),
    );
    let first = tokio::spawn(aggregator.request("posts", &ids(&[1])));

    // Act - a later tick, still inside the window
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = aggregator.request("posts", &ids(&[2]));
    let (first, second) = (first.await.unwrap(), second.await);

    // Assert
    assert!(first.is_ok() && second.is_ok());
    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1, 2])]);
}

#[tokio::test]
async fn test_fetched_records_are_written_to_cache() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);

    // Act
    aggregator.request("posts", &ids(&[1, 2, 42])).await.unwrap();

    // Assert
    let cache = aggregator.cache();
    assert_eq!(cache.get(&CacheKey::new("posts", 1)), Some(post(1)));
    assert_eq!(cache.get(&CacheKey::new("posts", 2)), Some(post(2)));
    assert!(!cache.contains(&CacheKey::new("posts", 42)));
    assert!(!cache.is_fetching(&CacheKey::new("posts", 1)));
}

// ============================================================
// Section 5: Query Observer
// ============================================================

#[tokio::test]
async fn test_query_mount_loads_then_settles_with_data() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);

    // Act
    let initial = query.observe("posts", &ids(&[1, 2]), QueryOptions::new());
    let settled = query.settled().await;

    // Assert
    assert!(initial.is_loading && initial.is_fetching);
    assert_eq!(initial.data, None);
    assert_eq!(initial.error, None);
    assert_eq!(settled.data, Some(vec![Some(post(1)), Some(post(2))]));
    assert!(!settled.is_loading && !settled.is_fetching);
    assert_eq!(settled.error, None);
}

#[tokio::test]
async fn test_observers_in_one_tick_share_one_call() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let queries: Vec<_> = (0..3).map(|_| create_query(&aggregator)).collect();

    // Act
    queries[0].observe("posts", &ids(&[1, 2]), QueryOptions::new());
    queries[1].observe("posts", &ids(&[2, 3]), QueryOptions::new());
    queries[2].observe("posts", &ids(&[3, 4]), QueryOptions::new());
    for query in &queries {
        query.settled().await;
    }

    // Assert
    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1, 2, 3, 4])]);
    assert_eq!(
        queries[2].state().data,
        Some(vec![Some(post(3)), Some(post(4))])
    );
}

#[tokio::test]
async fn test_reobserving_unchanged_parameters_issues_no_call() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);

    query.observe("posts", &ids(&[1, 2]), QueryOptions::new());
    query.settled().await;
    query.observe("posts", &ids(&[1, 2]), QueryOptions::new());
    query.observe("posts", &ids(&[1, 2]), QueryOptions::new());
    query.settled().await;

    assert_eq!(provider.call_count(ProviderOperation::GetMany), 1);
}

#[tokio::test]
async fn test_changing_ids_issues_exactly_one_new_call() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    query.observe("posts", &ids(&[1, 2]), QueryOptions::new());
    query.settled().await;

    // Act
    query.observe("posts", &ids(&[3, 4]), QueryOptions::new());
    query.observe("posts", &ids(&[3, 4]), QueryOptions::new());
    let settled = query.settled().await;

    // Assert
    assert_eq!(
        provider.get_many_calls("posts"),
        vec![ids(&[1, 2]), ids(&[3, 4])]
    );
    assert_eq!(settled.data, Some(vec![Some(post(3)), Some(post(4))]));
}

#[tokio::test]
async fn test_id_order_counts_as_a_change() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);

    query.observe("posts", &ids(&[1, 2]), QueryOptions::new());
    query.settled().await;
    query.observe("posts", &ids(&[2, 1]), QueryOptions::new());
    query.settled().await;

    assert_eq!(
        provider.get_many_calls("posts"),
        vec![ids(&[1, 2]), ids(&[2, 1])]
    );
}

#[tokio::test]
async fn test_changing_resource_issues_exactly_one_new_call() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);

    query.observe("posts", &ids(&[1, 2]), QueryOptions::new());
    query.settled().await;
    query.observe("comments", &ids(&[1, 2]), QueryOptions::new());
    query.settled().await;

    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1, 2])]);
    assert_eq!(provider.get_many_calls("comments"), vec![ids(&[1, 2])]);
}

#[tokio::test]
async fn test_zero_ids_issue_no_call_on_mount_or_update() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);

    let mounted = query.observe("posts", &[], QueryOptions::new());
    let updated = query.observe("comments", &[], QueryOptions::new());
    query.settled().await;

    assert!(!mounted.is_loading && !mounted.is_fetching);
    assert!(!updated.is_fetching);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_disabled_query_issues_no_call_on_mount_or_update() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);

    query.observe("posts", &ids(&[1]), QueryOptions::new().enabled(false));
    query.observe("posts", &ids(&[1, 2]), QueryOptions::new().enabled(false));
    query.settled().await;

    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_enabling_a_query_issues_the_call() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);

    query.observe("posts", &ids(&[1]), QueryOptions::new().enabled(false));
    query.observe("posts", &ids(&[1]), QueryOptions::new());
    let settled = query.settled().await;

    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1])]);
    assert_eq!(settled.data, Some(vec![Some(post(1))]));
}

// ============================================================
// Section 6: Query Callbacks and Errors
// ============================================================

#[tokio::test]
async fn test_failing_batch_sets_error_for_every_caller_once() {
    // Arrange
    let provider = create_provider();
    provider.fail_next(ProviderOperation::GetMany, ProviderError::rejected("failed"));
    let aggregator = create_aggregator(&provider);
    let first = create_query(&aggregator);
    let second = create_query(&aggregator);
    let errors = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let options = {
        let errors = Arc::clone(&errors);
        let successes = Arc::clone(&successes);
        QueryOptions::new()
            .on_error(move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move |_| {
                successes.fetch_add(1, Ordering::SeqCst);
            })
    };

    // Act
    let before = first.observe("posts", &ids(&[1]), options.clone());
    second.observe("posts", &ids(&[2]), options);
    let first_state = first.settled().await;
    let second_state = second.settled().await;

    // Assert
    let expected = AggregateError::Provider(ProviderError::rejected("failed"));
    assert_eq!(before.error, None);
    assert_eq!(first_state.error, Some(expected.clone()));
    assert_eq!(second_state.error, Some(expected));
    assert_eq!(errors.load(Ordering::SeqCst), 2);
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(provider.call_count(ProviderOperation::GetMany), 1);
}

#[tokio::test]
async fn test_changed_ids_start_without_the_previous_error() {
    // Arrange
    let provider = create_provider();
    provider.fail_next(ProviderOperation::GetMany, ProviderError::rejected("failed"));
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    query.observe("posts", &ids(&[1]), QueryOptions::new());
    let failed = query.settled().await;
    assert!(failed.error.is_some());

    // Act
    let loading = query.observe("posts", &ids(&[2]), QueryOptions::new());
    let settled = query.settled().await;

    // Assert
    assert!(loading.is_loading);
    assert_eq!(loading.error, None);
    assert_eq!(settled.error, None);
    assert_eq!(settled.data, Some(vec![Some(post(2))]));
}

#[tokio::test]
async fn test_disabling_clears_the_previous_error() {
    // Arrange
    let provider = create_provider();
    provider.fail_next(ProviderOperation::GetMany, ProviderError::rejected("again"));
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    query.observe("posts", &ids(&[1]), QueryOptions::new());
    assert!(query.settled().await.error.is_some());

    // Act
    let disabled = query.observe("posts", &ids(&[3]), QueryOptions::new().enabled(false));

    // Assert
    assert!(!disabled.is_fetching);
    assert!(disabled.data.is_none());
    assert_eq!(disabled.error, None);
    assert_eq!(provider.call_count(ProviderOperation::GetMany), 1);
}

#[tokio::test]
async fn test_refetch_keeps_error_until_it_succeeds() {
    // Arrange
    let provider = create_provider();
    provider.fail_next(ProviderOperation::GetMany, ProviderError::rejected("failed"));
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    query.observe("posts", &ids(&[1]), QueryOptions::new());
    query.settled().await;

    // Act
    query.refetch();
    let refetching = query.state();
    let settled = query.settled().await;

    // Assert
    assert!(refetching.is_fetching);
    assert!(refetching.error.is_some());
    assert_eq!(settled.error, None);
    assert_eq!(settled.data, Some(vec![Some(post(1))]));
}

#[tokio::test]
async fn test_successful_batch_never_sets_error() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let options = {
        let received = Arc::clone(&received);
        QueryOptions::new().on_success(move |records| received.lock().push(records.to_vec()))
    };
    let mut states = query.subscribe();

    // Act
    query.observe("posts", &ids(&[1, 2]), options);
    query.settled().await;

    // Assert
    assert!(states.borrow_and_update().error.is_none());
    assert_eq!(
        *received.lock(),
        vec![vec![Some(post(1)), Some(post(2))]]
    );
}

#[tokio::test]
async fn test_callbacks_do_not_fire_before_the_call_settles() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    let successes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&successes);

    query.observe(
        "posts",
        &ids(&[1]),
        QueryOptions::new().on_success(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    assert_eq!(successes.load(Ordering::SeqCst), 0);

    query.settled().await;
    assert_eq!(successes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_response_is_discarded() {
    // Arrange
    let provider = Arc::new(
        MemoryDataProvider::new()
            .with_records("posts", (1..=3).map(post))
            .with_latency(Duration::from_millis(100)),
    );
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let options = {
        let seen = Arc::clone(&seen);
        QueryOptions::new().on_success(move |records| seen.lock().push(records.to_vec()))
    };

    // Act - change ids while the first call is in flight
    query.observe("posts", &ids(&[1]), options.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;
    query.observe("posts", &ids(&[2]), options);
    let settled = query.settled().await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Assert
    assert_eq!(settled.data, Some(vec![Some(post(2))]));
    assert_eq!(query.state().data, Some(vec![Some(post(2))]));
    assert_eq!(*seen.lock(), vec![vec![Some(post(2))]]);
}

// ============================================================
// Section 7: Query Freshness
// ============================================================

#[tokio::test]
async fn test_cached_data_is_shown_while_refetching_stale_entries() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    aggregator
        .cache()
        .insert(CacheKey::new("posts", 1), Record::new(1).with_field("title", "cached"));
    let query = create_query(&aggregator);

    // Act
    let mounted = query.observe("posts", &ids(&[1]), QueryOptions::new());
    let settled = query.settled().await;

    // Assert
    assert!(!mounted.is_loading);
    assert!(mounted.is_fetching);
    assert_eq!(
        mounted.data,
        Some(vec![Some(Record::new(1).with_field("title", "cached"))])
    );
    assert_eq!(settled.data, Some(vec![Some(post(1))]));
    assert_eq!(provider.call_count(ProviderOperation::GetMany), 1);
}

#[tokio::test]
async fn test_fresh_cached_data_issues_no_call() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    aggregator.cache().insert(CacheKey::new("posts", 1), post(1));
    let query = GetManyQuery::new(aggregator.clone(), Duration::from_secs(60));

    let mounted = query.observe("posts", &ids(&[1]), QueryOptions::new());

    assert_eq!(mounted.data, Some(vec![Some(post(1))]));
    assert!(!mounted.is_loading && !mounted.is_fetching);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn test_refetch_reissues_current_request() {
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = GetManyQuery::new(aggregator.clone(), Duration::from_secs(60));

    query.observe("posts", &ids(&[1]), QueryOptions::new());
    query.settled().await;
    query.refetch();
    let refetching = query.state();
    query.settled().await;

    assert!(refetching.is_fetching && !refetching.is_loading);
    assert_eq!(provider.get_many_calls("posts"), vec![ids(&[1]), ids(&[1])]);
}

#[tokio::test]
async fn test_rerender_picks_up_cache_writes() {
    // Arrange
    let provider = create_provider();
    let aggregator = create_aggregator(&provider);
    let query = create_query(&aggregator);
    query.observe("posts", &ids(&[1]), QueryOptions::new());
    query.settled().await;

    // Act
    let edited = Record::new(1).with_field("title", "edited locally");
    aggregator
        .cache()
        .insert(CacheKey::new("posts", 1), edited.clone());
    let rerendered = query.observe("posts", &ids(&[1]), QueryOptions::new());

    // Assert
    assert_eq!(rerendered.data, Some(vec![Some(edited)]));
    assert_eq!(provider.call_count(ProviderOperation::GetMany), 1);
}

// ============================================================
// Section 8: IdSet Properties
// ============================================================

proptest! {
    #[test]
    fn prop_merge_is_dedup_of_concatenation(
        left in proptest::collection::vec(0i64..20, 0..30),
        right in proptest::collection::vec(0i64..20, 0..30),
    ) {
        let mut merged = IdSet::from_ids(left.iter().copied());
        merged.merge(&IdSet::from_ids(right.iter().copied()));

        let mut seen = HashSet::new();
        let expected: Vec<Identifier> = left
            .iter()
            .chain(right.iter())
            .filter(|id| seen.insert(**id))
            .map(|&id| Identifier::Int(id))
            .collect();

        prop_assert_eq!(merged.as_slice(), expected.as_slice());
    }

    #[test]
    fn prop_merge_reports_number_added(
        left in proptest::collection::vec(0i64..20, 0..30),
        right in proptest::collection::vec(0i64..20, 0..30),
    ) {
        let mut merged = IdSet::from_ids(left.iter().copied());
        let before = merged.len();
        let added = merged.merge(&IdSet::from_ids(right.iter().copied()));

        prop_assert_eq!(merged.len(), before + added);
        for id in left.iter().chain(right.iter()) {
            prop_assert!(merged.contains(&Identifier::Int(*id)));
        }
    }
}

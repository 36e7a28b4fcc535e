//! Data types for request aggregation.

use std::collections::HashSet;
use std::time::Duration;

use dataloom_provider::{Identifier, ProviderError, Record};

/// Ordered set of identifiers.
///
/// Merging keeps the position of the first occurrence of every id and drops
/// later duplicates, so `[1, 2]` merged with `[2, 3]` is `[1, 2, 3]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ids: Vec<Identifier>,
    seen: HashSet<Identifier>,
}

impl IdSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from ids, keeping first-seen order.
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Identifier>,
    {
        let mut set = Self::new();
        set.extend(ids);
        set
    }

    /// Appends `id` unless already present. Returns whether it was added.
    pub fn insert(&mut self, id: impl Into<Identifier>) -> bool {
        let id = id.into();
        if self.seen.insert(id.clone()) {
            self.ids.push(id);
            true
        } else {
            false
        }
    }

    /// Appends every id of `other` not yet present. Returns how many were added.
    pub fn merge(&mut self, other: &IdSet) -> usize {
        other
            .ids
            .iter()
            .filter(|id| self.insert((*id).clone()))
            .count()
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Identifier> {
        self.ids.iter()
    }

    pub fn as_slice(&self) -> &[Identifier] {
        &self.ids
    }

    pub fn into_vec(self) -> Vec<Identifier> {
        self.ids
    }
}

impl<T: Into<Identifier>> Extend<T> for IdSet {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for id in iter {
            self.insert(id);
        }
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = &'a Identifier;
    type IntoIter = std::slice::Iter<'a, Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

/// Per-request options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// When false the request registers no interest and resolves to
    /// [`ReadResult::NotFetched`].
    pub enabled: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Outcome of an aggregated read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// No provider work was done (empty id set or disabled request).
    NotFetched,
    /// One slot per requested id, in requested order; `None` where the
    /// provider did not return the id.
    Fetched(Vec<Option<Record>>),
}

impl ReadResult {
    pub fn is_fetched(&self) -> bool {
        matches!(self, ReadResult::Fetched(_))
    }

    pub fn records(&self) -> Option<&[Option<Record>]> {
        match self {
            ReadResult::Fetched(records) => Some(records),
            ReadResult::NotFetched => None,
        }
    }

    pub fn into_records(self) -> Option<Vec<Option<Record>>> {
        match self {
            ReadResult::Fetched(records) => Some(records),
            ReadResult::NotFetched => None,
        }
    }
}

/// Configuration for the request aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// How long a window accumulates before it is dispatched.
    ///
    /// Zero means "until the scheduling task yields once", which groups every
    /// request issued in the same tick.
    pub batch_window: Duration,
}

impl AggregatorConfig {
    pub fn with_batch_window(mut self, batch_window: Duration) -> Self {
        self.batch_window = batch_window;
        self
    }
}

/// Errors delivered to aggregated readers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// The shared provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The window was dropped before its call settled.
    #[error("batch for resource '{resource}' was dropped before it settled")]
    BatchDropped { resource: String },
}

/// Result type for aggregation operations.
pub type AggregateResult<T> = Result<T, AggregateError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[i64]) -> Vec<Identifier> {
        values.iter().map(|&v| Identifier::Int(v)).collect()
    }

    #[test]
    fn test_from_ids_drops_duplicates_keeping_first_position() {
        let set = IdSet::from_ids([3, 1, 3, 2, 1]);
        assert_eq!(set.as_slice(), ids(&[3, 1, 2]).as_slice());
    }

    #[test]
    fn test_merge_appends_unseen_ids_in_order() {
        // Arrange
        let mut merged = IdSet::from_ids([1, 2]);

        // Act
        let added_first = merged.merge(&IdSet::from_ids([2, 3]));
        let added_second = merged.merge(&IdSet::from_ids([3, 4]));

        // Assert
        assert_eq!(added_first, 1);
        assert_eq!(added_second, 1);
        assert_eq!(merged.into_vec(), ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_string_and_integer_ids_do_not_collapse() {
        let set = IdSet::from_ids([Identifier::from(1), Identifier::from("1")]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_request_options_enabled_by_default() {
        assert!(RequestOptions::default().enabled);
    }

    #[test]
    fn test_read_result_accessors() {
        let fetched = ReadResult::Fetched(vec![None]);
        assert!(fetched.is_fetched());
        assert_eq!(fetched.records().map(<[_]>::len), Some(1));
        assert_eq!(ReadResult::NotFetched.into_records(), None);
    }
}

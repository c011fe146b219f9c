//! In-memory incident dataset and the store that owns it.
//!
//! The dataset is immutable once built. [`IncidentStore`] hands out `Arc`
//! snapshots so a reload swaps the whole dataset at once and a query in flight
//! keeps reading the version it started with.

pub mod fetch;
pub mod loader;
pub mod query;

use std::sync::{Arc, RwLock};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::QaError;

pub use query::{
    AdvancedQuery, AdvancedQueryResult, Breakdown, CodeDetail, CodeOverview, ErrorResult,
    FocusedBreakdown, GroupBy, IncidentQueries, QueryFilters, QueryResult, SampleRecord,
    DEFAULT_LIMIT, DEFAULT_TOP_N, IUCR_EXPLANATION,
};

/// One incident row after column normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub case_number: String,
    pub date: Option<NaiveDateTime>,
    pub block: String,
    pub location_description: String,
    pub year: Option<i32>,
    /// Raw column text; numeric filters coerce it at query time.
    pub district: String,
    pub ward: String,
    pub community_area: String,
    pub arrest: bool,
    pub domestic: bool,
    pub iucr: String,
    pub primary_type: String,
    pub description: String,
}

/// Ordered, read-only collection of records plus where it came from.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<Record>,
    source: String,
}

impl Dataset {
    pub fn new(records: Vec<Record>, source: impl Into<String>) -> Self {
        Self { records, source: source.into() }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owner of the current dataset.
#[derive(Debug, Default)]
pub struct IncidentStore {
    current: RwLock<Option<Arc<Dataset>>>,
}

impl IncidentStore {
    /// A store with nothing loaded; every query answers `DataUnavailable`.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(dataset: Dataset) -> Self {
        Self { current: RwLock::new(Some(Arc::new(dataset))) }
    }

    /// Swap in a fully built dataset.
    pub fn replace(&self, dataset: Dataset) {
        let next = Arc::new(dataset);
        info!(target: "dataset", records = next.len(), source = %next.source(), "dataset_replaced");
        let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(next);
    }

    /// Snapshot of the current dataset.
    pub fn snapshot(&self) -> Result<Arc<Dataset>, QaError> {
        let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
        guard.as_ref().cloned().ok_or(QaError::DataUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(case: &str) -> Record {
        Record { case_number: case.to_string(), ..Default::default() }
    }

    #[test]
    fn empty_store_is_unavailable() {
        let store = IncidentStore::empty();
        assert_eq!(store.snapshot().unwrap_err(), QaError::DataUnavailable);
    }

    #[test]
    fn snapshot_survives_replace() {
        let store = IncidentStore::new(Dataset::new(vec![rec("A1")], "test"));
        let before = store.snapshot().unwrap();
        store.replace(Dataset::new(vec![rec("B1"), rec("B2")], "reload"));
        let after = store.snapshot().unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before.records()[0].case_number, "A1");
        assert_eq!(after.len(), 2);
        assert_eq!(after.source(), "reload");
    }
}

use crate::common::constants::progress_key;
use crate::common::error::Result;
use crate::storage::ObjectStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

const PROGRESS_VERSION: u32 = 1;

/// Durable progress for one job type, persisted as a single versioned JSON
/// blob. Progress is an optimization, not a correctness guarantee: a lost or
/// corrupt blob only means re-fetching work the dedup layer will discard.
///
/// Not safe for concurrent runs of the same source; the design assumes at
/// most one job instance per source at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    pub version: u32,
    /// Identity keys that must never be re-fetched/re-enriched. Grows
    /// monotonically across runs, never shrinks.
    pub processed_keys: BTreeSet<String>,
    /// Units of work (e.g. cities) already crawled in the current cycle.
    pub completed_units: Vec<String>,
    pub total_runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            version: PROGRESS_VERSION,
            processed_keys: BTreeSet::new(),
            completed_units: Vec::new(),
            total_runs: 0,
            last_run_at: None,
        }
    }
}

impl ProgressState {
    pub fn is_processed(&self, key: &str) -> bool {
        self.processed_keys.contains(key)
    }

    pub fn mark_processed(&mut self, key: impl Into<String>) {
        self.processed_keys.insert(key.into());
    }

    pub fn complete_unit(&mut self, unit: &str) {
        if !self.completed_units.iter().any(|u| u == unit) {
            self.completed_units.push(unit.to_string());
        }
    }

    /// Next unit of work: the first entry of `units` not yet completed. Once
    /// every unit is done the cursor wraps to the first unit, starting a full
    /// re-crawl cycle (intentional perpetual refresh, see DESIGN.md).
    pub fn next_unit<'a>(&self, units: &[&'a str]) -> Option<&'a str> {
        units
            .iter()
            .find(|u| !self.completed_units.iter().any(|c| c == *u))
            .or_else(|| units.first())
            .copied()
    }

    /// Stamp the end of a successful run.
    pub fn record_run(&mut self) {
        self.total_runs += 1;
        self.last_run_at = Some(Utc::now());
    }
}

/// Load/save wrapper binding a source name to its blob key.
pub struct ProgressStore {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl ProgressStore {
    pub fn for_source(store: Arc<dyn ObjectStore>, source: &str) -> Self {
        Self {
            store,
            key: progress_key(source),
        }
    }

    /// Load the persisted state, falling back to the empty default when the
    /// blob is missing, unreadable, or corrupt.
    pub async fn load(&self) -> ProgressState {
        match self.store.get(&self.key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Progress blob is corrupt, starting fresh");
                    ProgressState::default()
                }
            },
            Ok(None) => ProgressState::default(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read progress blob, starting fresh");
                ProgressState::default()
            }
        }
    }

    /// Full overwrite of the blob. Callers load, mutate, and save within one
    /// job invocation.
    pub async fn save(&self, state: &ProgressState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.store.put(&self.key, &bytes).await?;
        debug!(key = %self.key, keys = state.processed_keys.len(), "Saved progress");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;

    #[tokio::test]
    async fn missing_blob_loads_default() {
        let store = Arc::new(InMemoryObjectStore::new());
        let progress = ProgressStore::for_source(store, "maps");
        assert_eq!(progress.load().await, ProgressState::default());
    }

    #[tokio::test]
    async fn corrupt_blob_loads_default() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put("state/maps_progress.json", b"not json{").await.unwrap();
        let progress = ProgressStore::for_source(store, "maps");
        assert_eq!(progress.load().await, ProgressState::default());
    }

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let store = Arc::new(InMemoryObjectStore::new());
        let progress = ProgressStore::for_source(store, "yelp");

        let mut state = progress.load().await;
        state.mark_processed("https://yelp.com/biz/a");
        state.complete_unit("Miami, FL");
        state.record_run();
        progress.save(&state).await.unwrap();

        let reloaded = progress.load().await;
        assert_eq!(reloaded, state);
        assert!(reloaded.is_processed("https://yelp.com/biz/a"));
    }

    #[tokio::test]
    async fn processed_keys_grow_monotonically_across_runs() {
        let store = Arc::new(InMemoryObjectStore::new());
        let progress = ProgressStore::for_source(store, "hunter");

        let mut state = progress.load().await;
        state.mark_processed("a");
        progress.save(&state).await.unwrap();

        let mut second = progress.load().await;
        let before: BTreeSet<String> = second.processed_keys.clone();
        second.mark_processed("b");
        progress.save(&second).await.unwrap();

        let after = progress.load().await;
        assert!(after.processed_keys.is_superset(&before));
    }

    #[test]
    fn cursor_walks_units_then_wraps() {
        let units = ["a", "b", "c"];
        let mut state = ProgressState::default();
        assert_eq!(state.next_unit(&units), Some("a"));
        state.complete_unit("a");
        assert_eq!(state.next_unit(&units), Some("b"));
        state.complete_unit("b");
        state.complete_unit("c");
        // all done: wrap to the first unit for a new cycle
        assert_eq!(state.next_unit(&units), Some("a"));
        assert_eq!(state.next_unit(&[]), None);
    }

    #[test]
    fn complete_unit_is_idempotent() {
        let mut state = ProgressState::default();
        state.complete_unit("a");
        state.complete_unit("a");
        assert_eq!(state.completed_units, vec!["a".to_string()]);
    }
}

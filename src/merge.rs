use crate::common::types::RawRecord;
use crate::storage::ObjectStore;
use std::collections::HashSet;
use tracing::warn;

/// Combine freshly fetched rows with the existing master dataset.
///
/// Incoming rows are concatenated before existing ones (newest-first), then
/// duplicates are removed by identity key keeping the first occurrence, so the
/// newest write wins. Rows for which `key_fn` yields `None` are retained
/// untouched. Idempotent: merging the same batch twice changes nothing.
pub fn merge_records<T, F>(existing: Vec<T>, incoming: Vec<T>, key_fn: F) -> Vec<T>
where
    F: Fn(&T) -> Option<String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(existing.len() + incoming.len());
    for row in incoming.into_iter().chain(existing) {
        match key_fn(&row) {
            Some(key) => {
                if seen.insert(key) {
                    out.push(row);
                }
            }
            None => out.push(row),
        }
    }
    out
}

/// Extract a non-blank string field for use as an identity key.
pub fn string_field_key(row: &RawRecord, field: &str) -> Option<String> {
    let value = row.get(field)?.as_str()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Load a master dataset snapshot. Missing or corrupt snapshots degrade to an
/// empty dataset; history loss here only costs re-fetching.
pub async fn load_master(store: &dyn ObjectStore, key: &str) -> Vec<RawRecord> {
    match store.get(key).await {
        Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(key, error = %e, "Master dataset snapshot is corrupt, starting empty");
                Vec::new()
            }
        },
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(key, error = %e, "Failed to read master dataset, starting empty");
            Vec::new()
        }
    }
}

/// Persist a master dataset snapshot as one full-overwrite JSON blob.
pub async fn save_master(
    store: &dyn ObjectStore,
    key: &str,
    rows: &[RawRecord],
) -> crate::Result<()> {
    let bytes = serde_json::to_vec_pretty(rows)?;
    store.put(key, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(row: &RawRecord) -> Option<String> {
        string_field_key(row, "key")
    }

    #[test]
    fn newest_write_wins() {
        let existing = vec![json!({"key": "a", "v": 1})];
        let incoming = vec![json!({"key": "a", "v": 2}), json!({"key": "b", "v": 3})];
        let merged = merge_records(existing, incoming, key);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], json!({"key": "a", "v": 2}));
        assert_eq!(merged[1], json!({"key": "b", "v": 3}));
    }

    #[test]
    fn merge_is_idempotent() {
        let existing = vec![json!({"key": "a", "v": 1}), json!({"key": "b", "v": 1})];
        let incoming = vec![json!({"key": "a", "v": 2})];
        let once = merge_records(existing, incoming.clone(), key);
        let twice = merge_records(once.clone(), incoming, key);
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_is_size_bounded_and_keys_unique() {
        let existing: Vec<_> = (0..5).map(|i| json!({"key": format!("e{i}")})).collect();
        let incoming: Vec<_> = (0..5).map(|i| json!({"key": format!("k{}", i % 3)})).collect();
        let merged = merge_records(existing.clone(), incoming.clone(), key);
        assert!(merged.len() <= existing.len() + incoming.len());
        let keys: Vec<_> = merged.iter().filter_map(key).collect();
        let unique: HashSet<_> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), unique.len());
        // every key present in inputs survives exactly once
        assert!(unique.contains("e0") && unique.contains("k0"));
    }

    #[test]
    fn first_run_degenerates_to_self_dedup() {
        let incoming = vec![
            json!({"key": "a", "v": 1}),
            json!({"key": "a", "v": 2}),
            json!({"key": "b", "v": 1}),
        ];
        let merged = merge_records(Vec::new(), incoming, key);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["v"], 1); // first occurrence kept within the batch
    }

    #[test]
    fn keyless_rows_are_retained() {
        let incoming = vec![json!({"v": 1}), json!({"v": 2}), json!({"key": "", "v": 3})];
        let merged = merge_records(Vec::new(), incoming, key);
        assert_eq!(merged.len(), 3);
    }
}

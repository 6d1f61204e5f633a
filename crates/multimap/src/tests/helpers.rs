use crate::{RecordStore, StoreError};
use std::path::Path;

/// Creates a store at `dir/name` with `buckets` buckets.
pub fn new_store(dir: &Path, name: &str, buckets: u32) -> Result<RecordStore, StoreError> {
    let mut store = RecordStore::new();
    store.create(dir.join(name), buckets)?;
    Ok(store)
}

/// Collects `(value, context)` pairs for `key` in iteration order.
pub fn pairs(store: &RecordStore, key: &str) -> Result<Vec<(String, String)>, StoreError> {
    store
        .search(key)?
        .map(|e| e.map(|e| (e.value, e.context)))
        .collect()
}

pub fn pair(value: &str, context: &str) -> (String, String) {
    (value.to_string(), context.to_string())
}

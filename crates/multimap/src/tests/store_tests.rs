use super::helpers::{new_store, pair, pairs};
use crate::format::{HEADER_BYTES, MAX_FIELD_LEN};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

// -------------------- Create / open / close --------------------

#[test]
fn create_writes_header_and_empty_buckets() -> Result<()> {
    let dir = tempdir()?;
    let store = new_store(dir.path(), "s.dmm", 16)?;

    assert!(store.is_open());
    assert_eq!(store.bucket_count(), 16);
    assert_eq!(store.file_len(), HEADER_BYTES + 16 * 8);
    assert!(!store.search("anything")?.is_valid());
    Ok(())
}

#[test]
fn zero_buckets_is_clamped_to_one() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 0)?;
    assert_eq!(store.bucket_count(), 1);

    store.insert("k", "v", "c")?;
    assert_eq!(pairs(&store, "k")?, vec![pair("v", "c")]);
    Ok(())
}

#[test]
fn round_trip_across_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("s.dmm");
    {
        let mut store = RecordStore::new();
        store.create(&path, 8)?;
        store.insert("a.exe", "b.exe", "m1")?;
        store.close();
    }

    let mut store = RecordStore::new();
    store.open(&path)?;
    assert_eq!(store.bucket_count(), 8);

    let it = store.search("a.exe")?;
    assert!(it.is_valid());
    let entry = it.get().unwrap();
    assert_eq!(
        entry,
        Entry {
            key: "a.exe".into(),
            value: "b.exe".into(),
            context: "m1".into(),
        }
    );
    Ok(())
}

#[test]
fn open_missing_file_fails() {
    let dir = tempdir().unwrap();
    let mut store = RecordStore::new();
    let res = store.open(dir.path().join("missing.dmm"));
    assert!(matches!(res, Err(StoreError::Block(_))));
    assert!(!store.is_open());
}

#[test]
fn open_foreign_file_is_bad_header() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("junk.dmm");
    std::fs::write(&path, vec![0xAB; 256])?;

    let mut store = RecordStore::new();
    let err = store.open(&path).unwrap_err();
    assert!(err.is_corruption(), "unexpected error: {err}");
    assert!(!store.is_open());
    Ok(())
}

#[test]
fn open_truncated_file_is_bad_header() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("s.dmm");
    {
        new_store(dir.path(), "s.dmm", 64)?;
    }
    let data = std::fs::read(&path)?;
    std::fs::write(&path, &data[..HEADER_BYTES as usize + 8])?;

    let mut store = RecordStore::new();
    assert!(matches!(store.open(&path), Err(StoreError::BadHeader(_))));

    std::fs::write(&path, &data[..10])?;
    assert!(matches!(store.open(&path), Err(StoreError::BadHeader(_))));

    std::fs::write(&path, b"")?;
    match store.open(&path) {
        Err(StoreError::BadHeader(msg)) => assert!(msg.contains("empty"), "{msg}"),
        other => panic!("expected bad header, got {other:?}"),
    }
    Ok(())
}

#[test]
fn large_table_is_laid_out_in_full() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("s.dmm");
    // several layout chunks plus a partial one
    let buckets = 3 * 8 * 1024 + 17;
    {
        let mut store = new_store(dir.path(), "s.dmm", buckets)?;
        assert_eq!(store.file_len(), HEADER_BYTES + u64::from(buckets) * 8);
        for i in 0..200 {
            store.insert(&format!("k{i}"), "v", "c")?;
        }
        store.sync()?;
    }

    let data = std::fs::read(&path)?;
    let table = &data[HEADER_BYTES as usize..HEADER_BYTES as usize + buckets as usize * 8];
    let empty = table
        .chunks(8)
        .filter(|slot| *slot == (-1i64).to_le_bytes())
        .count();
    // 200 keys occupy at most 200 buckets; every other slot is null
    assert!(empty >= buckets as usize - 200 && empty < buckets as usize);

    let mut store = RecordStore::new();
    store.open(&path)?;
    assert_eq!(store.bucket_count(), buckets);
    for i in 0..200 {
        assert_eq!(pairs(&store, &format!("k{i}"))?, vec![pair("v", "c")]);
    }
    Ok(())
}

#[test]
fn close_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let mut never_opened = RecordStore::new();
    never_opened.close();
    never_opened.close();

    let mut store = new_store(dir.path(), "s.dmm", 4)?;
    store.close();
    store.close();
    assert!(!store.is_open());
    assert_eq!(store.bucket_count(), 0);
    Ok(())
}

#[test]
fn create_replaces_existing_contents() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 4)?;
    store.insert("k", "v", "c")?;

    store.create(dir.path().join("s.dmm"), 4)?;
    assert!(!store.search("k")?.is_valid());
    Ok(())
}

// -------------------- Insert / search --------------------

#[test]
fn values_iterate_in_insertion_order() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    store.insert("k", "v1", "c1")?;
    store.insert("k", "v2", "c2")?;
    store.insert("k", "v3", "c3")?;

    assert_eq!(
        pairs(&store, "k")?,
        vec![pair("v1", "c1"), pair("v2", "c2"), pair("v3", "c3")]
    );
    Ok(())
}

#[test]
fn duplicate_pairs_are_kept() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    store.insert("k", "v", "c")?;
    store.insert("k", "v", "c")?;

    assert_eq!(pairs(&store, "k")?, vec![pair("v", "c"), pair("v", "c")]);
    Ok(())
}

#[test]
fn colliding_keys_stay_distinct() -> Result<()> {
    let dir = tempdir()?;
    // one bucket: every key shares a chain
    let mut store = new_store(dir.path(), "s.dmm", 1)?;
    for i in 0..20 {
        store.insert(&format!("key{i}"), &format!("val{i}"), "ctx")?;
    }
    store.insert("key7", "extra", "ctx2")?;

    for i in 0..20 {
        let got = pairs(&store, &format!("key{i}"))?;
        let mut want = vec![pair(&format!("val{i}"), "ctx")];
        if i == 7 {
            want.push(pair("extra", "ctx2"));
        }
        assert_eq!(got, want, "key{i}");
    }
    assert!(!store.search("key20")?.is_valid());
    Ok(())
}

#[test]
fn many_keys_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("s.dmm");
    {
        let mut store = RecordStore::new();
        store.create(&path, 50)?;
        for i in 0..200 {
            store.insert(&format!("k{}", i % 40), &format!("v{i}"), &format!("c{i}"))?;
        }
    }

    let mut store = RecordStore::new();
    store.open(&path)?;
    for k in 0..40 {
        let got = pairs(&store, &format!("k{k}"))?;
        let want: Vec<_> = (0..200)
            .filter(|i| i % 40 == k)
            .map(|i| pair(&format!("v{i}"), &format!("c{i}")))
            .collect();
        assert_eq!(got, want);
    }
    Ok(())
}

#[test]
fn iterator_cursor_api() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    store.insert("k", "v1", "c1")?;
    store.insert("k", "v2", "c2")?;

    let mut it = store.search("k")?;
    assert!(it.is_valid());
    assert_eq!(it.get().unwrap().key, "k");
    assert_eq!(it.get().unwrap().value, "v1");

    it.advance()?;
    assert!(it.is_valid());
    assert_eq!(it.get().unwrap().value, "v2");

    it.advance()?;
    assert!(!it.is_valid());
    assert!(it.get().is_none());

    // advancing past the end stays invalid
    it.advance()?;
    assert!(!it.is_valid());
    Ok(())
}

#[test]
fn search_missing_key_is_invalid() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    store.insert("present", "v", "c")?;

    let mut it = store.search("absent")?;
    assert!(!it.is_valid());
    assert!(it.next().is_none());
    Ok(())
}

#[test]
fn search_on_closed_store_is_invalid() -> Result<()> {
    let store = RecordStore::new();
    assert!(!store.search("k")?.is_valid());
    Ok(())
}

#[test]
fn empty_strings_are_storable() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    store.insert("", "", "")?;
    assert_eq!(pairs(&store, "")?, vec![pair("", "")]);
    Ok(())
}

// -------------------- Validation --------------------

#[test]
fn max_length_fields_are_accepted() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    let long = "x".repeat(MAX_FIELD_LEN);
    store.insert(&long, &long, &long)?;
    assert_eq!(pairs(&store, &long)?, vec![pair(&long, &long)]);
    Ok(())
}

#[test]
fn oversized_fields_are_rejected_before_writing() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    let len_before = store.file_len();
    let long = "x".repeat(MAX_FIELD_LEN + 1);

    for (k, v, c, field) in [
        (long.as_str(), "v", "c", "key"),
        ("k", long.as_str(), "c", "value"),
        ("k", "v", long.as_str(), "context"),
    ] {
        let err = store.insert(k, v, c).unwrap_err();
        assert!(err.is_validation());
        match err {
            StoreError::FieldTooLong { field: f, len, max } => {
                assert_eq!(f, field);
                assert_eq!(len, MAX_FIELD_LEN + 1);
                assert_eq!(max, MAX_FIELD_LEN);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(store.file_len(), len_before);
    assert!(!store.search("k")?.is_valid());
    Ok(())
}

#[test]
fn nul_bytes_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut store = new_store(dir.path(), "s.dmm", 8)?;
    let err = store.insert("k", "a\0b", "c").unwrap_err();
    assert!(matches!(err, StoreError::InvalidField { field: "value" }));
    Ok(())
}

#[test]
fn sync_on_closed_store_fails() {
    let mut store = RecordStore::new();
    assert!(matches!(store.sync(), Err(StoreError::NotOpen)));
}

#[test]
fn insert_on_closed_store_fails() {
    let mut store = RecordStore::new();
    let err = store.insert("k", "v", "c").unwrap_err();
    assert!(matches!(err, StoreError::NotOpen));
    assert!(err.is_validation());
}

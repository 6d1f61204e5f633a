//! # Multimap - Disk-Resident Multi-Valued Hash Map
//!
//! A hash table that lives entirely in one file. Each key maps to an ordered
//! chain of `(value, context)` pairs; the same pair may be stored more than
//! once.
//!
//! ## File layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ HEADER       magic | buckets | free heads    │  offset 0
//! ├──────────────────────────────────────────────┤
//! │ BUCKET TABLE bucket_count x i64              │  -1 = empty
//! ├──────────────────────────────────────────────┤
//! │ RECORDS      KeyRecord / ValueRecord slots   │  appended or reused
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ```text
//! bucket[h(key)] ─▶ KeyRecord ─next─▶ KeyRecord ─▶ -1
//!                      │
//!                 value_head
//!                      ▼
//!                 ValueRecord ─next─▶ ValueRecord ─▶ -1
//! ```
//!
//! Erased slots are pushed onto one of two free lists (keys, values) whose
//! heads live in the header, and are reused before the file grows. The file
//! never shrinks. See [`format`] for the byte-level layout.
//!
//! ## Example
//!
//! ```rust,no_run
//! use multimap::RecordStore;
//!
//! let mut store = RecordStore::new();
//! store.create("events.dmm", 1024).unwrap();
//! store.insert("a.exe", "b.exe", "m1").unwrap();
//!
//! for entry in store.search("a.exe").unwrap() {
//!     let entry = entry.unwrap();
//!     println!("{} -> {} ({})", entry.key, entry.value, entry.context);
//! }
//! ```

pub mod error;
pub mod format;
mod iter;
mod store;

pub use error::StoreError;
pub use format::MAX_FIELD_LEN;
pub use iter::{Entry, ResultIter};
pub use store::RecordStore;

#[cfg(test)]
mod tests;

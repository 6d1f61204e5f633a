//! The disk multimap: bucket table, key chains, value chains and free lists.
//!
//! Every structural link is an [`Offset`] resolved through the block file.
//! Mutations follow one ordering rule: a record is fully written into its slot
//! before anything links to it, and a record is unlinked before its slot is
//! pushed onto a free list. Free-list pops persist the header immediately. A
//! crash between steps can leak a slot but never makes one slot reachable
//! from two chains.

use blockfile::BlockFile;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::path::Path;
use tracing::debug;

use crate::error::StoreError;
use crate::format::{
    bucket_for, bucket_pos, records_start, validate_field, Header, KeyRecord, Offset,
    ValueRecord, BUCKET_BYTES, HEADER_BYTES, KEY_RECORD_BYTES, VALUE_RECORD_BYTES,
};
use crate::iter::ResultIter;

/// Bucket slots written per call while laying out a new table (64 KiB).
const TABLE_CHUNK_SLOTS: u32 = 8 * 1024;

/// Where a key lives (or would live) inside its bucket chain.
struct KeyLocation {
    bucket: u32,
    /// Predecessor of `found`, or the chain tail when `found` is `None`.
    prev: Option<KeyRecord>,
    found: Option<KeyRecord>,
}

/// A multi-valued hash map persisted in a single file.
///
/// One key maps to an ordered chain of `(value, context)` pairs. Pairs are
/// appended at the chain tail so [`search`](RecordStore::search) yields them
/// in insertion order, duplicates included.
///
/// The store is single-owner and synchronous. A live [`ResultIter`] holds a
/// shared borrow, so `insert`, `erase` and `close` cannot run while one is
/// alive.
pub struct RecordStore {
    file: BlockFile,
    header: Header,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.file.path())
            .field("open", &self.file.is_open())
            .field("file_len", &self.file.len())
            .field("bucket_count", &self.header.bucket_count)
            .field("key_free", &self.header.key_free.raw())
            .field("value_free", &self.header.value_free.raw())
            .finish()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    /// Returns a closed store.
    pub fn new() -> Self {
        Self {
            file: BlockFile::new(),
            header: Header::new(0),
        }
    }

    /// Creates a fresh store at `path` with `bucket_count` empty buckets
    /// (at least one). An existing file is truncated; a store that is
    /// already open is closed first.
    pub fn create<P: AsRef<Path>>(&mut self, path: P, bucket_count: u32) -> Result<(), StoreError> {
        self.close();
        let bucket_count = bucket_count.max(1);
        self.file.create(path.as_ref())?;
        self.header = Header::new(bucket_count);

        if let Err(e) = self.init_layout() {
            self.close();
            return Err(e);
        }
        debug!(path = %path.as_ref().display(), bucket_count, "created record store");
        Ok(())
    }

    fn init_layout(&mut self) -> Result<(), StoreError> {
        self.write_header()?;
        let mut chunk = Vec::with_capacity(TABLE_CHUNK_SLOTS as usize * BUCKET_BYTES as usize);
        for _ in 0..TABLE_CHUNK_SLOTS {
            chunk.write_i64::<LittleEndian>(Offset::NULL.raw())?;
        }

        let mut remaining = self.header.bucket_count;
        while remaining > 0 {
            let slots = remaining.min(TABLE_CHUNK_SLOTS);
            self.file.append(&chunk[..slots as usize * BUCKET_BYTES as usize])?;
            remaining -= slots;
        }
        debug_assert_eq!(self.file.len(), records_start(self.header.bucket_count));
        Ok(())
    }

    /// Opens an existing store and loads its header.
    ///
    /// Only the header is validated (magic, checksum, and that the file holds
    /// the whole bucket table); chains are checked lazily as they are walked.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<(), StoreError> {
        self.close();
        self.file.open(path.as_ref())?;

        match self.load_header() {
            Ok(header) => {
                self.header = header;
                debug!(
                    path = %path.as_ref().display(),
                    bucket_count = header.bucket_count,
                    file_len = self.file.len(),
                    "opened record store"
                );
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn load_header(&self) -> Result<Header, StoreError> {
        if self.file.is_empty() {
            return Err(StoreError::BadHeader("file is empty".into()));
        }
        if self.file.len() < HEADER_BYTES {
            return Err(StoreError::BadHeader(format!(
                "file too small for header: {} bytes",
                self.file.len()
            )));
        }
        let mut buf = [0u8; HEADER_BYTES as usize];
        self.file.read_at(0, &mut buf)?;
        let header = Header::decode(&buf)?;
        if self.file.len() < records_start(header.bucket_count) {
            return Err(StoreError::BadHeader(format!(
                "file too small for {} buckets",
                header.bucket_count
            )));
        }
        Ok(header)
    }

    /// Forces everything written so far to disk.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        if !self.is_open() {
            return Err(StoreError::NotOpen);
        }
        self.file.sync()?;
        Ok(())
    }

    /// Releases the file. Safe to call repeatedly or on a store that was
    /// never opened.
    pub fn close(&mut self) {
        self.file.close();
        self.header = Header::new(0);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.file.is_open()
    }

    /// Number of buckets (0 when closed).
    #[must_use]
    pub fn bucket_count(&self) -> u32 {
        self.header.bucket_count
    }

    /// Current file length in bytes. Never decreases while the store is open.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        self.file.len()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.file.path()
    }

    /// Appends `(value, context)` to the chain for `key`, creating the key if
    /// needed.
    ///
    /// All three fields are validated before anything is written. A failed
    /// write aborts the call without undoing the writes that preceded it.
    pub fn insert(&mut self, key: &str, value: &str, context: &str) -> Result<(), StoreError> {
        if !self.is_open() {
            return Err(StoreError::NotOpen);
        }
        validate_field("key", key)?;
        validate_field("value", value)?;
        validate_field("context", context)?;

        let loc = self.locate(key)?;
        let tail = match &loc.found {
            Some(key_rec) if !key_rec.value_head.is_null() => {
                Some(self.value_tail(key_rec.value_head)?)
            }
            _ => None,
        };

        let value_at = self.alloc_value()?;
        self.write_value(&ValueRecord {
            value: value.to_string(),
            context: context.to_string(),
            next: Offset::NULL,
            self_offset: value_at,
        })?;

        match (loc.found, tail) {
            (Some(_), Some(mut tail)) => {
                tail.next = value_at;
                self.write_value(&tail)?;
            }
            (Some(mut key_rec), None) => {
                key_rec.value_head = value_at;
                self.write_key(&key_rec)?;
            }
            (None, _) => {
                let key_at = self.alloc_key()?;
                self.write_key(&KeyRecord {
                    key: key.to_string(),
                    value_head: value_at,
                    next: Offset::NULL,
                    self_offset: key_at,
                })?;
                match loc.prev {
                    Some(mut tail) => {
                        tail.next = key_at;
                        self.write_key(&tail)?;
                    }
                    None => self.write_bucket(loc.bucket, key_at)?,
                }
            }
        }
        Ok(())
    }

    /// Looks up `key` and returns an iterator over its `(value, context)`
    /// pairs in insertion order.
    ///
    /// A missing key, or a closed store, yields an iterator that is already
    /// invalid.
    pub fn search(&self, key: &str) -> Result<ResultIter<'_>, StoreError> {
        if !self.is_open() {
            return Ok(ResultIter::exhausted(self, key));
        }
        match self.locate(key)?.found {
            Some(rec) => ResultIter::start(self, key, rec.value_head),
            None => Ok(ResultIter::exhausted(self, key)),
        }
    }

    /// Removes every `(value, context)` pair under `key` that equals the
    /// given one and returns how many were removed.
    ///
    /// When the last pair goes, the key record is unlinked from its bucket
    /// and its slot is reclaimed too. A missing key removes nothing.
    pub fn erase(&mut self, key: &str, value: &str, context: &str) -> Result<usize, StoreError> {
        if !self.is_open() {
            return Err(StoreError::NotOpen);
        }
        let loc = self.locate(key)?;
        let mut key_rec = match loc.found {
            Some(rec) => rec,
            None => return Ok(0),
        };

        let limit = self.chain_limit(VALUE_RECORD_BYTES);
        let mut removed = 0usize;
        let mut prev: Option<ValueRecord> = None;
        let mut cur = key_rec.value_head;
        let mut steps = 0u64;

        while !cur.is_null() {
            steps += 1;
            if steps > limit {
                return Err(Self::cycle(cur));
            }
            let rec = self.read_value(cur)?;
            let next = rec.next;
            if rec.value == value && rec.context == context {
                match prev.as_mut() {
                    Some(p) => {
                        p.next = next;
                        self.write_value(p)?;
                    }
                    None => {
                        key_rec.value_head = next;
                        self.write_key(&key_rec)?;
                    }
                }
                self.free_value(cur)?;
                removed += 1;
            } else {
                prev = Some(rec);
            }
            cur = next;
        }

        if key_rec.value_head.is_null() {
            match loc.prev {
                Some(mut p) => {
                    p.next = key_rec.next;
                    self.write_key(&p)?;
                }
                None => self.write_bucket(loc.bucket, key_rec.next)?,
            }
            self.free_key(key_rec.self_offset)?;
            debug!(key, "erased key record");
        }
        Ok(removed)
    }

    // ---- Chain walking ----

    fn locate(&self, key: &str) -> Result<KeyLocation, StoreError> {
        let bucket = bucket_for(key, self.header.bucket_count);
        let limit = self.chain_limit(KEY_RECORD_BYTES);
        let mut prev = None;
        let mut cur = self.read_bucket(bucket)?;
        let mut steps = 0u64;

        while !cur.is_null() {
            steps += 1;
            if steps > limit {
                return Err(Self::cycle(cur));
            }
            let rec = self.read_key(cur)?;
            if rec.key == key {
                return Ok(KeyLocation {
                    bucket,
                    prev,
                    found: Some(rec),
                });
            }
            cur = rec.next;
            prev = Some(rec);
        }
        Ok(KeyLocation {
            bucket,
            prev,
            found: None,
        })
    }

    fn value_tail(&self, head: Offset) -> Result<ValueRecord, StoreError> {
        let limit = self.chain_limit(VALUE_RECORD_BYTES);
        let mut rec = self.read_value(head)?;
        let mut steps = 1u64;
        while !rec.next.is_null() {
            steps += 1;
            if steps > limit {
                return Err(Self::cycle(rec.next));
            }
            rec = self.read_value(rec.next)?;
        }
        Ok(rec)
    }

    /// Upper bound on the length of any chain of `record_bytes`-sized
    /// records; walking further means the chain loops.
    pub(crate) fn chain_limit(&self, record_bytes: usize) -> u64 {
        self.file.len() / record_bytes as u64 + 1
    }

    pub(crate) fn cycle(at: Offset) -> StoreError {
        StoreError::Corrupt {
            offset: at.raw(),
            reason: "chain does not terminate".into(),
        }
    }

    // ---- Slot allocation ----

    fn alloc_value(&mut self) -> Result<Offset, StoreError> {
        let head = self.header.value_free;
        if head.is_null() {
            return Ok(Offset::at(self.file.len()));
        }
        let slot = self.read_value(head)?;
        self.header.value_free = slot.next;
        self.write_header()?;
        debug!(offset = head.raw(), "reusing freed value slot");
        Ok(head)
    }

    fn alloc_key(&mut self) -> Result<Offset, StoreError> {
        let head = self.header.key_free;
        if head.is_null() {
            return Ok(Offset::at(self.file.len()));
        }
        let slot = self.read_key(head)?;
        self.header.key_free = slot.next;
        self.write_header()?;
        debug!(offset = head.raw(), "reusing freed key slot");
        Ok(head)
    }

    fn free_value(&mut self, at: Offset) -> Result<(), StoreError> {
        self.write_value(&ValueRecord::freed(at, self.header.value_free))?;
        self.header.value_free = at;
        self.write_header()
    }

    fn free_key(&mut self, at: Offset) -> Result<(), StoreError> {
        self.write_key(&KeyRecord::freed(at, self.header.key_free))?;
        self.header.key_free = at;
        self.write_header()
    }

    // ---- Record I/O ----

    fn write_header(&mut self) -> Result<(), StoreError> {
        let buf = self.header.encode()?;
        self.file.write_at(0, &buf)?;
        Ok(())
    }

    fn read_bucket(&self, index: u32) -> Result<Offset, StoreError> {
        let mut buf = [0u8; BUCKET_BYTES as usize];
        self.file.read_at(bucket_pos(index), &mut buf)?;
        Ok(Offset::from_raw((&buf[..]).read_i64::<LittleEndian>()?))
    }

    fn write_bucket(&mut self, index: u32, target: Offset) -> Result<(), StoreError> {
        self.file.write_at(bucket_pos(index), &target.raw().to_le_bytes())?;
        Ok(())
    }

    /// Validates that a record of `size` bytes at `at` lies wholly inside the
    /// record region of the file.
    fn check_offset(&self, at: Offset, size: usize) -> Result<u64, StoreError> {
        let corrupt = |reason: &str| StoreError::Corrupt {
            offset: at.raw(),
            reason: reason.to_string(),
        };
        let pos = at.pos().ok_or_else(|| corrupt("negative offset"))?;
        if pos < records_start(self.header.bucket_count) {
            return Err(corrupt("offset points into header or bucket table"));
        }
        if pos.checked_add(size as u64).map_or(true, |end| end > self.file.len()) {
            return Err(corrupt("record extends past end of file"));
        }
        Ok(pos)
    }

    pub(crate) fn read_key(&self, at: Offset) -> Result<KeyRecord, StoreError> {
        let pos = self.check_offset(at, KEY_RECORD_BYTES)?;
        let mut buf = [0u8; KEY_RECORD_BYTES];
        self.file.read_at(pos, &mut buf)?;
        let rec = KeyRecord::decode(&buf).map_err(|e| StoreError::Corrupt {
            offset: at.raw(),
            reason: e.to_string(),
        })?;
        if rec.self_offset != at {
            return Err(StoreError::Corrupt {
                offset: at.raw(),
                reason: format!("key record claims offset {}", rec.self_offset.raw()),
            });
        }
        Ok(rec)
    }

    pub(crate) fn read_value(&self, at: Offset) -> Result<ValueRecord, StoreError> {
        let pos = self.check_offset(at, VALUE_RECORD_BYTES)?;
        let mut buf = [0u8; VALUE_RECORD_BYTES];
        self.file.read_at(pos, &mut buf)?;
        let rec = ValueRecord::decode(&buf).map_err(|e| StoreError::Corrupt {
            offset: at.raw(),
            reason: e.to_string(),
        })?;
        if rec.self_offset != at {
            return Err(StoreError::Corrupt {
                offset: at.raw(),
                reason: format!("value record claims offset {}", rec.self_offset.raw()),
            });
        }
        Ok(rec)
    }

    fn write_key(&mut self, rec: &KeyRecord) -> Result<(), StoreError> {
        let pos = rec.self_offset.pos().ok_or(StoreError::Corrupt {
            offset: rec.self_offset.raw(),
            reason: "negative offset".into(),
        })?;
        self.file.write_at(pos, &rec.encode()?)?;
        Ok(())
    }

    fn write_value(&mut self, rec: &ValueRecord) -> Result<(), StoreError> {
        let pos = rec.self_offset.pos().ok_or(StoreError::Corrupt {
            offset: rec.self_offset.raw(),
            reason: "negative offset".into(),
        })?;
        self.file.write_at(pos, &rec.encode()?)?;
        Ok(())
    }
}

//! On-disk layout of a disk multimap and the codecs for each record kind.
//!
//! ## Header (28 bytes, offset 0)
//!
//! ```text
//! [magic: u32 LE "DMM1"][bucket_count: u32 LE]
//! [key_free_head: i64 LE][value_free_head: i64 LE][crc32: u32 LE]
//! ```
//!
//! The CRC32 covers the 24 bytes before it.
//!
//! ## Bucket table (`bucket_count` x 8 bytes, immediately after the header)
//!
//! ```text
//! [key_record_offset: i64 LE] ...
//! ```
//!
//! ## KeyRecord (152 bytes)
//!
//! ```text
//! [key: 128 bytes, NUL padded][value_head: i64][next_in_bucket: i64][self_offset: i64]
//! ```
//!
//! ## ValueRecord (272 bytes)
//!
//! ```text
//! [value: 128 bytes][context: 128 bytes][next_in_chain: i64][self_offset: i64]
//! ```
//!
//! An offset of `-1` is null. Once a slot is erased its link field
//! (`next_in_bucket` / `next_in_chain`) holds the next free slot instead.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Write};

use crate::error::StoreError;

/// Magic number identifying a disk multimap file (ASCII "DMM1").
pub const STORE_MAGIC: u32 = 0x444D_4D31;

/// Size of the header in bytes.
pub const HEADER_BYTES: u64 = 4 + 4 + 8 + 8 + 4;

/// Size of one bucket-table slot in bytes.
pub const BUCKET_BYTES: u64 = 8;

/// Width of every string field on disk.
pub const FIELD_BYTES: usize = 128;

/// Longest key, value, or context accepted; one byte is kept for the
/// terminating NUL.
pub const MAX_FIELD_LEN: usize = FIELD_BYTES - 1;

/// Size of a key record in bytes.
pub const KEY_RECORD_BYTES: usize = FIELD_BYTES + 8 + 8 + 8;

/// Size of a value record in bytes.
pub const VALUE_RECORD_BYTES: usize = FIELD_BYTES * 2 + 8 + 8;

/// A record id: the byte offset of a record inside the store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Offset(i64);

impl Offset {
    /// The null link.
    pub const NULL: Offset = Offset(-1);

    /// Wraps a file position.
    pub fn at(pos: u64) -> Self {
        Offset(pos as i64)
    }

    pub fn from_raw(raw: i64) -> Self {
        Offset(raw)
    }

    pub fn raw(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    /// File position of a non-null offset. Negative offsets other than the
    /// null sentinel yield `None`.
    pub fn pos(self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }
}

/// Position of bucket slot `index`.
pub fn bucket_pos(index: u32) -> u64 {
    HEADER_BYTES + u64::from(index) * BUCKET_BYTES
}

/// First byte after the bucket table; every record lives at or beyond it.
pub fn records_start(bucket_count: u32) -> u64 {
    bucket_pos(bucket_count)
}

/// Chooses a bucket for `key`: FNV-1a 64 modulo `bucket_count`.
///
/// The hash is fixed so that a file written by one build can be searched by
/// another.
pub fn bucket_for(key: &str, bucket_count: u32) -> u32 {
    (fnv1a_64(key.as_bytes()) % u64::from(bucket_count)) as u32
}

fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = FNV_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Rejects strings that cannot be stored in a fixed-width field.
pub fn validate_field(field: &'static str, s: &str) -> Result<(), StoreError> {
    if s.len() > MAX_FIELD_LEN {
        return Err(StoreError::FieldTooLong {
            field,
            len: s.len(),
            max: MAX_FIELD_LEN,
        });
    }
    if s.as_bytes().contains(&0) {
        return Err(StoreError::InvalidField { field });
    }
    Ok(())
}

fn write_field<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let mut buf = [0u8; FIELD_BYTES];
    let n = s.len().min(MAX_FIELD_LEN);
    buf[..n].copy_from_slice(&s.as_bytes()[..n]);
    w.write_all(&buf)
}

fn read_field<R: Read>(r: &mut R) -> io::Result<String> {
    let mut buf = [0u8; FIELD_BYTES];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(FIELD_BYTES);
    String::from_utf8(buf[..end].to_vec())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// The fixed header at offset 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub bucket_count: u32,
    pub key_free: Offset,
    pub value_free: Offset,
}

impl Header {
    pub fn new(bucket_count: u32) -> Self {
        Self {
            bucket_count,
            key_free: Offset::NULL,
            value_free: Offset::NULL,
        }
    }

    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_BYTES as usize);
        buf.write_u32::<LittleEndian>(STORE_MAGIC)?;
        buf.write_u32::<LittleEndian>(self.bucket_count)?;
        buf.write_i64::<LittleEndian>(self.key_free.raw())?;
        buf.write_i64::<LittleEndian>(self.value_free.raw())?;

        let mut hasher = Crc32::new();
        hasher.update(&buf);
        buf.write_u32::<LittleEndian>(hasher.finalize())?;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, StoreError> {
        if buf.len() < HEADER_BYTES as usize {
            return Err(StoreError::BadHeader(format!(
                "expected {} bytes, got {}",
                HEADER_BYTES,
                buf.len()
            )));
        }

        let mut r = buf;
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != STORE_MAGIC {
            return Err(StoreError::BadHeader(format!("unknown magic {:#x}", magic)));
        }
        let bucket_count = r.read_u32::<LittleEndian>()?;
        let key_free = Offset::from_raw(r.read_i64::<LittleEndian>()?);
        let value_free = Offset::from_raw(r.read_i64::<LittleEndian>()?);
        let crc = r.read_u32::<LittleEndian>()?;

        let mut hasher = Crc32::new();
        hasher.update(&buf[..HEADER_BYTES as usize - 4]);
        let actual = hasher.finalize();
        if actual != crc {
            return Err(StoreError::BadHeader(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                crc, actual
            )));
        }
        if bucket_count == 0 {
            return Err(StoreError::BadHeader("bucket count is zero".into()));
        }

        Ok(Self {
            bucket_count,
            key_free,
            value_free,
        })
    }
}

/// One distinct key within a bucket, heading a chain of value records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub key: String,
    pub value_head: Offset,
    pub next: Offset,
    pub self_offset: Offset,
}

impl KeyRecord {
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(KEY_RECORD_BYTES);
        write_field(&mut buf, &self.key)?;
        buf.write_i64::<LittleEndian>(self.value_head.raw())?;
        buf.write_i64::<LittleEndian>(self.next.raw())?;
        buf.write_i64::<LittleEndian>(self.self_offset.raw())?;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        let mut r = buf;
        let key = read_field(&mut r)?;
        let value_head = Offset::from_raw(r.read_i64::<LittleEndian>()?);
        let next = Offset::from_raw(r.read_i64::<LittleEndian>()?);
        let self_offset = Offset::from_raw(r.read_i64::<LittleEndian>()?);
        Ok(Self {
            key,
            value_head,
            next,
            self_offset,
        })
    }

    /// An erased key slot: blank key, link field reused as the free-list next.
    pub fn freed(at: Offset, next_free: Offset) -> Self {
        Self {
            key: String::new(),
            value_head: Offset::NULL,
            next: next_free,
            self_offset: at,
        }
    }
}

/// One stored `(value, context)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    pub value: String,
    pub context: String,
    pub next: Offset,
    pub self_offset: Offset,
}

impl ValueRecord {
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(VALUE_RECORD_BYTES);
        write_field(&mut buf, &self.value)?;
        write_field(&mut buf, &self.context)?;
        buf.write_i64::<LittleEndian>(self.next.raw())?;
        buf.write_i64::<LittleEndian>(self.self_offset.raw())?;
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        let mut r = buf;
        let value = read_field(&mut r)?;
        let context = read_field(&mut r)?;
        let next = Offset::from_raw(r.read_i64::<LittleEndian>()?);
        let self_offset = Offset::from_raw(r.read_i64::<LittleEndian>()?);
        Ok(Self {
            value,
            context,
            next,
            self_offset,
        })
    }

    /// An erased value slot.
    pub fn freed(at: Offset, next_free: Offset) -> Self {
        Self {
            value: String::new(),
            context: String::new(),
            next: next_free,
            self_offset: at,
        }
    }
}

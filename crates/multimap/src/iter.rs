use crate::error::StoreError;
use crate::format::{Offset, ValueRecord, VALUE_RECORD_BYTES};
use crate::store::RecordStore;

/// One `(key, value, context)` triple yielded by a search.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entry {
    pub key: String,
    pub value: String,
    pub context: String,
}

/// Forward-only cursor over the value chain of one key.
///
/// Produced by [`RecordStore::search`]. The current record is read eagerly,
/// so [`get`](ResultIter::get) never touches the disk; [`advance`](ResultIter::advance)
/// follows the stored `next` link. Once the chain ends the iterator stays
/// invalid; searching again is the only way to restart.
///
/// Also usable as a standard [`Iterator`] of `Result<Entry, StoreError>`.
/// A read failure while advancing is reported after the entry that was
/// already loaded.
pub struct ResultIter<'a> {
    store: &'a RecordStore,
    key: String,
    current: Option<ValueRecord>,
    steps: u64,
    failed: Option<StoreError>,
}

impl<'a> ResultIter<'a> {
    pub(crate) fn exhausted(store: &'a RecordStore, key: &str) -> Self {
        Self {
            store,
            key: key.to_string(),
            current: None,
            steps: 0,
            failed: None,
        }
    }

    pub(crate) fn start(store: &'a RecordStore, key: &str, head: Offset) -> Result<Self, StoreError> {
        let mut it = Self::exhausted(store, key);
        if !head.is_null() {
            it.current = Some(store.read_value(head)?);
            it.steps = 1;
        }
        Ok(it)
    }

    /// `true` while positioned on a record of an open store.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.current.is_some() && self.store.is_open()
    }

    /// The entry at the current position, or `None` once invalid.
    pub fn get(&self) -> Option<Entry> {
        if !self.is_valid() {
            return None;
        }
        self.current.as_ref().map(|rec| Entry {
            key: self.key.clone(),
            value: rec.value.clone(),
            context: rec.context.clone(),
        })
    }

    /// Moves to the next record in the chain. Advancing an invalid iterator
    /// is a no-op. On error the iterator becomes invalid.
    pub fn advance(&mut self) -> Result<(), StoreError> {
        let next = match self.current.take() {
            Some(rec) => rec.next,
            None => return Ok(()),
        };
        if next.is_null() {
            return Ok(());
        }
        self.steps += 1;
        if self.steps > self.store.chain_limit(VALUE_RECORD_BYTES) {
            return Err(RecordStore::cycle(next));
        }
        self.current = Some(self.store.read_value(next)?);
        Ok(())
    }
}

impl Iterator for ResultIter<'_> {
    type Item = Result<Entry, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failed.take() {
            return Some(Err(err));
        }
        let entry = self.get()?;
        if let Err(e) = self.advance() {
            self.failed = Some(e);
        }
        Some(Ok(entry))
    }
}

impl std::fmt::Debug for ResultIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultIter")
            .field("key", &self.key)
            .field("valid", &self.is_valid())
            .field("offset", &self.current.as_ref().map(|r| r.self_offset.raw()))
            .finish()
    }
}

//! # Crawler - Interaction Graph over Two Disk Multimaps
//!
//! Stores security telemetry (`context initiator target` interactions) and
//! answers one question: starting from known-bad indicators, which entities
//! are connected to them through interactions, without expanding through
//! popular (presumed benign) entities?
//!
//! ## Storage
//!
//! Every interaction is written twice, once per index:
//!
//! ```text
//! <prefix>-initiator.dmm   initiator -> (target, context)
//! <prefix>-target.dmm      target    -> (initiator, context)
//! ```
//!
//! so that all interactions touching an entity, in either role, are two
//! searches away.
//!
//! ## Module Responsibilities
//!
//! | Module          | Purpose                                              |
//! |-----------------|------------------------------------------------------|
//! | [`lib.rs`]      | `Crawler` struct, create/open/close, mirrored insert, lookups |
//! | [`ingest`]      | Telemetry line parsing and bulk ingestion            |
//! | [`crawl`]       | Bounded breadth-first crawl with a popularity cutoff |
//! | [`purge`]       | Removing an entity from both indexes                 |
//! | [`interaction`] | The `Interaction` edge type                          |
mod crawl;
mod ingest;
mod interaction;
mod purge;

use anyhow::{Context, Result};
use multimap::{RecordStore, StoreError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use crawl::CrawlReport;
pub use ingest::{parse_line, IngestStats, Line};
pub use interaction::Interaction;

/// File-name suffix of the index keyed by initiator.
pub const INITIATOR_SUFFIX: &str = "-initiator.dmm";
/// File-name suffix of the index keyed by target.
pub const TARGET_SUFFIX: &str = "-target.dmm";

/// Returns the `(by_initiator, by_target)` store paths for `prefix`.
pub fn store_paths<P: AsRef<Path>>(prefix: P) -> (PathBuf, PathBuf) {
    let with_suffix = |suffix: &str| {
        let mut s: OsString = prefix.as_ref().as_os_str().to_os_string();
        s.push(suffix);
        PathBuf::from(s)
    };
    (with_suffix(INITIATOR_SUFFIX), with_suffix(TARGET_SUFFIX))
}

/// Two mirrored disk multimaps holding the interaction graph.
///
/// Both stores are opened and closed together; if either fails to create or
/// open, both end up closed.
pub struct Crawler {
    pub(crate) by_initiator: RecordStore,
    pub(crate) by_target: RecordStore,
    prefix: Option<PathBuf>,
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("prefix", &self.prefix)
            .field("by_initiator", &self.by_initiator)
            .field("by_target", &self.by_target)
            .finish()
    }
}

impl Default for Crawler {
    fn default() -> Self {
        Self::new()
    }
}

impl Crawler {
    /// Returns a crawler with both stores closed.
    pub fn new() -> Self {
        Self {
            by_initiator: RecordStore::new(),
            by_target: RecordStore::new(),
            prefix: None,
        }
    }

    /// Creates both stores for `prefix`, sized for about `max_items`
    /// interactions using the default load factor.
    pub fn create<P: AsRef<Path>>(&mut self, prefix: P, max_items: u32) -> Result<()> {
        self.create_with_load_factor(prefix, max_items, config::DEFAULT_LOAD_FACTOR)
    }

    /// Creates both stores with `ceil(max_items * load_factor)` buckets each.
    pub fn create_with_load_factor<P: AsRef<Path>>(
        &mut self,
        prefix: P,
        max_items: u32,
        load_factor: f64,
    ) -> Result<()> {
        self.close();
        let buckets = config::bucket_count(max_items, load_factor);
        let (init_path, target_path) = store_paths(&prefix);

        let res = self
            .by_initiator
            .create(&init_path, buckets)
            .with_context(|| format!("failed to create {}", init_path.display()))
            .and_then(|()| {
                self.by_target
                    .create(&target_path, buckets)
                    .with_context(|| format!("failed to create {}", target_path.display()))
            });
        if res.is_err() {
            self.close();
            return res;
        }
        debug!(prefix = %prefix.as_ref().display(), buckets, "created crawler stores");
        self.prefix = Some(prefix.as_ref().to_path_buf());
        Ok(())
    }

    /// Opens both existing stores for `prefix`.
    pub fn open<P: AsRef<Path>>(&mut self, prefix: P) -> Result<()> {
        self.close();
        let (init_path, target_path) = store_paths(&prefix);

        let res = self
            .by_initiator
            .open(&init_path)
            .with_context(|| format!("failed to open {}", init_path.display()))
            .and_then(|()| {
                self.by_target
                    .open(&target_path)
                    .with_context(|| format!("failed to open {}", target_path.display()))
            });
        if res.is_err() {
            self.close();
            return res;
        }
        debug!(prefix = %prefix.as_ref().display(), "opened crawler stores");
        self.prefix = Some(prefix.as_ref().to_path_buf());
        Ok(())
    }

    /// Closes both stores. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.by_initiator.close();
        self.by_target.close();
        self.prefix = None;
    }

    /// `true` when both stores are open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.by_initiator.is_open() && self.by_target.is_open()
    }

    /// Prefix of the open stores, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&Path> {
        self.prefix.as_deref()
    }

    /// Records one interaction in both indexes.
    ///
    /// The initiator index is written first; if the target index then fails
    /// the first write is not undone.
    pub fn insert(&mut self, interaction: &Interaction) -> Result<()> {
        anyhow::ensure!(self.is_open(), "crawler is not open");
        self.insert_mirrored(interaction)?;
        Ok(())
    }

    /// Writes `interaction` into both indexes, initiator index first.
    ///
    /// Both indexes validate the same three strings, so a validation error
    /// always comes from the first insert, before anything is written.
    pub(crate) fn insert_mirrored(&mut self, interaction: &Interaction) -> Result<(), StoreError> {
        let Interaction {
            context,
            initiator,
            target,
        } = interaction;
        self.by_initiator.insert(initiator, target, context)?;
        self.by_target.insert(target, initiator, context)
    }

    /// Flushes both stores to disk.
    pub fn sync(&mut self) -> Result<()> {
        anyhow::ensure!(self.is_open(), "crawler is not open");
        self.by_initiator.sync()?;
        self.by_target.sync()?;
        Ok(())
    }

    /// Every stored interaction touching `entity`: first those it initiated
    /// (in insertion order), then those it was the target of.
    pub fn interactions_of(&self, entity: &str) -> Result<Vec<Interaction>> {
        anyhow::ensure!(self.is_open(), "crawler is not open");
        let mut out = Vec::new();
        for entry in self.by_initiator.search(entity)? {
            let entry = entry?;
            out.push(Interaction::new(entry.context, entity, entry.value));
        }
        for entry in self.by_target.search(entity)? {
            let entry = entry?;
            out.push(Interaction::new(entry.context, entry.value, entity));
        }
        Ok(out)
    }

    /// Number of stored interactions where `entity` is initiator or target.
    /// A self-interaction counts once per role.
    pub fn prevalence(&self, entity: &str) -> Result<u64> {
        self.count_interactions(entity, u64::MAX)
    }

    /// Counts interactions touching `entity`, stopping once `limit` is
    /// reached.
    pub(crate) fn count_interactions(&self, entity: &str, limit: u64) -> Result<u64> {
        anyhow::ensure!(self.is_open(), "crawler is not open");
        let mut count = 0u64;
        for store in [&self.by_initiator, &self.by_target] {
            for entry in store.search(entity)? {
                entry?;
                count += 1;
                if count >= limit {
                    return Ok(count);
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests;

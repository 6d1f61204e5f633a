//! Removing an entity from the graph.
//!
//! Each interaction lives in both indexes, keyed from opposite ends, so every
//! erase in one store is paired with the mirrored erase in the other.

use anyhow::Result;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::Crawler;

impl Crawler {
    /// Removes every interaction in which `entity` is initiator or target.
    /// Returns `true` if anything was removed.
    pub fn purge(&mut self, entity: &str) -> Result<bool> {
        anyhow::ensure!(self.is_open(), "crawler is not open");
        let mut removed = 0usize;

        // Collect first: a live iterator borrows the store.
        let outgoing = Self::distinct_pairs(self.by_initiator.search(entity)?)?;
        for (target, context) in &outgoing {
            let a = self.by_initiator.erase(entity, target, context)?;
            let b = self.by_target.erase(target, entity, context)?;
            if a != b {
                warn!(entity, target = %target, context = %context, a, b, "indexes disagree");
            }
            removed += a.max(b);
        }

        let incoming = Self::distinct_pairs(self.by_target.search(entity)?)?;
        for (initiator, context) in &incoming {
            let a = self.by_target.erase(entity, initiator, context)?;
            let b = self.by_initiator.erase(initiator, entity, context)?;
            if a != b {
                warn!(entity, initiator = %initiator, context = %context, a, b, "indexes disagree");
            }
            removed += a.max(b);
        }

        info!(entity, removed, "purged entity");
        Ok(removed > 0)
    }

    /// Distinct `(value, context)` pairs yielded by a search.
    fn distinct_pairs(it: multimap::ResultIter<'_>) -> Result<BTreeSet<(String, String)>> {
        let mut pairs = BTreeSet::new();
        for entry in it {
            let entry = entry?;
            pairs.insert((entry.value, entry.context));
        }
        Ok(pairs)
    }
}

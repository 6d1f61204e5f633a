//! Bounded breadth-first crawl from a set of indicator entities.
//!
//! Every entity moves through `Unvisited -> Queued -> Resolved`; an entity
//! absent from the state map is unvisited. Only queued entities are expanded
//! and resolution is terminal, so each entity is expanded at most once and
//! the crawl always terminates.

use anyhow::Result;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, info};

use crate::{Crawler, Interaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Queued,
    Resolved,
}

/// What a crawl found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    /// Every entity classified as bad, seeds included. Sorted, unique.
    pub bad_entities: Vec<String>,
    /// Every interaction with at least one bad endpoint, sorted by
    /// `(context, initiator, target)`, unique.
    pub interactions: Vec<Interaction>,
}

impl CrawlReport {
    /// Number of bad entities found.
    #[must_use]
    pub fn bad_count(&self) -> usize {
        self.bad_entities.len()
    }
}

impl Crawler {
    /// Crawls outward from `seeds`.
    ///
    /// Seeds are always bad and always expanded. A newly discovered entity is
    /// bad, and expanded in turn, only if it takes part in fewer than
    /// `min_prevalence_to_be_good` interactions; otherwise it is considered
    /// popular and never expanded, though the interaction that reached it is
    /// still reported.
    pub fn crawl<S: AsRef<str>>(
        &self,
        seeds: &[S],
        min_prevalence_to_be_good: u32,
    ) -> Result<CrawlReport> {
        anyhow::ensure!(self.is_open(), "crawler is not open");
        let threshold = u64::from(min_prevalence_to_be_good);

        let mut state: HashMap<String, Visit> = HashMap::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut bad: BTreeSet<String> = BTreeSet::new();
        let mut found: BTreeSet<Interaction> = BTreeSet::new();
        // entity -> is popular; computed at most once per crawl
        let mut popular: HashMap<String, bool> = HashMap::new();

        for seed in seeds {
            let seed = seed.as_ref();
            if !state.contains_key(seed) {
                state.insert(seed.to_string(), Visit::Queued);
                queue.push_back(seed.to_string());
                bad.insert(seed.to_string());
            }
        }

        while let Some(entity) = queue.pop_front() {
            debug!(entity = %entity, queued = queue.len(), "expanding");
            for interaction in self.interactions_of(&entity)? {
                let other = if interaction.initiator == entity {
                    interaction.target.clone()
                } else {
                    interaction.initiator.clone()
                };
                found.insert(interaction);

                if state.contains_key(&other) {
                    continue;
                }
                let is_popular = match popular.get(&other) {
                    Some(&p) => p,
                    None => {
                        let p = self.count_interactions(&other, threshold)? >= threshold;
                        popular.insert(other.clone(), p);
                        p
                    }
                };
                if !is_popular {
                    state.insert(other.clone(), Visit::Queued);
                    bad.insert(other.clone());
                    queue.push_back(other);
                }
            }
            state.insert(entity, Visit::Resolved);
        }

        debug_assert!(state.values().all(|v| *v == Visit::Resolved));
        info!(
            seeds = seeds.len(),
            bad = bad.len(),
            interactions = found.len(),
            popular = popular.values().filter(|p| **p).count(),
            "crawl finished"
        );

        Ok(CrawlReport {
            bad_entities: bad.into_iter().collect(),
            interactions: found.into_iter().collect(),
        })
    }
}

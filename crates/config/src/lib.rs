//! # Config - Crawler Settings
//!
//! All settings come from environment variables with built-in defaults:
//!
//! ```text
//! SPIDER_PREFIX          store path prefix              (default: "data/spider")
//! SPIDER_MAX_ITEMS       capacity hint for new stores   (default: 100000)
//! SPIDER_MIN_PREVALENCE  default crawl threshold        (default: 10)
//! SPIDER_LOAD_FACTOR     buckets per expected item      (default: 1.333)
//! ```
//!
//! Unparseable values fall back to the default.

use std::path::PathBuf;

use thiserror::Error;

/// Default store path prefix.
pub const DEFAULT_PREFIX: &str = "data/spider";
/// Default capacity hint passed to `create`.
pub const DEFAULT_MAX_ITEMS: u32 = 100_000;
/// Default popularity cutoff for crawls.
pub const DEFAULT_MIN_PREVALENCE: u32 = 10;
/// Default number of buckets per expected item (4/3).
pub const DEFAULT_LOAD_FACTOR: f64 = 4.0 / 3.0;

/// A rejected configuration value.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("load factor must be a finite number > 0, got {0}")]
    LoadFactor(f64),
    #[error("store prefix must not be empty")]
    EmptyPrefix,
}

/// Settings shared by the crawler and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path prefix; stores live at `<prefix>-initiator.dmm` and `<prefix>-target.dmm`.
    pub prefix: PathBuf,
    /// Expected number of interactions, used to size the bucket table.
    pub max_items: u32,
    /// Entities with at least this many interactions are never expanded.
    pub min_prevalence: u32,
    /// Buckets allocated per expected item.
    pub load_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from(DEFAULT_PREFIX),
            max_items: DEFAULT_MAX_ITEMS,
            min_prevalence: DEFAULT_MIN_PREVALENCE,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl Config {
    /// Builds a configuration from `SPIDER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Missing or
    /// unparseable entries use the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Self {
            prefix: lookup("SPIDER_PREFIX")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .unwrap_or(d.prefix),
            max_items: lookup("SPIDER_MAX_ITEMS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(d.max_items),
            min_prevalence: lookup("SPIDER_MIN_PREVALENCE")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(d.min_prevalence),
            load_factor: lookup("SPIDER_LOAD_FACTOR")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(d.load_factor),
        }
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.load_factor.is_finite() || self.load_factor <= 0.0 {
            return Err(ConfigError::LoadFactor(self.load_factor));
        }
        if self.prefix.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(())
    }

    /// Bucket count for a store expected to hold `max_items` entries.
    #[must_use]
    pub fn bucket_count(&self, max_items: u32) -> u32 {
        bucket_count(max_items, self.load_factor)
    }
}

/// `ceil(max_items * load_factor)`, clamped to `[1, u32::MAX]`.
#[must_use]
pub fn bucket_count(max_items: u32, load_factor: f64) -> u32 {
    let n = (f64::from(max_items) * load_factor).ceil();
    if n.is_nan() || n < 1.0 {
        1
    } else if n >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        n as u32
    }
}

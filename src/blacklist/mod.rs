//! Subscriber blacklist.
//!
//! A bloom filter keeps the hot-path check cheap; every bloom hit is
//! confirmed against the exact set, so the answer has neither false
//! negatives nor false positives.

mod bloom;

pub use bloom::{BloomFilter, HASH_COUNT};

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

/// Bits per entry used when no explicit filter size is configured.
pub const BITS_PER_ENTRY: usize = 10;

/// Smallest filter created from a cardinality hint.
pub const MIN_FILTER_BITS: usize = 1024;

/// Bloom filter size for an expected number of entries.
pub fn default_filter_bits(expected_entries: usize) -> usize {
    expected_entries
        .saturating_mul(BITS_PER_ENTRY)
        .max(MIN_FILTER_BITS)
}

/// Blacklist membership test.
#[derive(Debug, Clone)]
pub struct Blacklist {
    filter: BloomFilter,
    entries: HashSet<String>,
}

impl Blacklist {
    /// Create an empty blacklist with an `m`-bit filter.
    pub fn new(filter_bits: usize) -> Self {
        Self {
            filter: BloomFilter::new(filter_bits),
            entries: HashSet::new(),
        }
    }

    /// Build a loaded blacklist. `filter_bits` defaults to
    /// [`default_filter_bits`] of the entry count.
    pub fn from_entries<I, S>(entries: I, filter_bits: Option<usize>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: HashSet<String> = entries.into_iter().map(Into::into).collect();
        let bits = filter_bits.unwrap_or_else(|| default_filter_bits(entries.len()));

        let mut blacklist = Self::new(bits);
        blacklist.load(entries);
        blacklist
    }

    /// Replace the contents of both the filter and the exact set.
    ///
    /// Takes `&mut self`: loading cannot overlap with lookups.
    pub fn load<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.clear();
        self.entries.clear();

        for entry in entries {
            let entry = entry.into();
            self.filter.insert(&entry);
            self.entries.insert(entry);
        }

        info!(
            entries = self.entries.len(),
            filter_bits = self.filter.size_bits(),
            hashes = self.filter.hash_count(),
            expected_fpr = self.filter.expected_false_positive_rate(),
            "blacklist loaded"
        );
    }

    /// Whether `imsi` is blacklisted.
    pub fn contains(&self, imsi: &str) -> bool {
        if !self.filter.might_contain(imsi) {
            return false;
        }

        let hit = self.entries.contains(imsi);
        debug!(imsi, hit, "blacklist bloom hit confirmed");
        hit
    }

    /// Bloom stage only (for false-positive measurements).
    pub fn might_contain(&self, imsi: &str) -> bool {
        self.filter.might_contain(imsi)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filter(&self) -> &BloomFilter {
        &self.filter
    }
}

/// Blacklist shared read-only across tasks.
pub type SharedBlacklist = Arc<Blacklist>;

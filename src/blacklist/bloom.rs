//! Bloom filter over IMSI strings.
//!
//! INVARIANT: no false negatives. Anything inserted since the last
//! [`BloomFilter::clear`] makes `might_contain` return true.

use std::io::Cursor;

use bitvec::prelude::*;

/// Number of probes per element.
pub const HASH_COUNT: usize = 7;

/// Fixed-size bloom filter using double hashing.
#[derive(Clone, Debug)]
pub struct BloomFilter {
    bits: BitVec<u64, Lsb0>,
    k: usize,
    n: usize,
}

impl BloomFilter {
    /// Create an empty filter with `m` bits (at least one) and `k = 7`.
    pub fn new(m: usize) -> Self {
        Self::with_hashes(m, HASH_COUNT)
    }

    /// Create an empty filter with an explicit probe count.
    pub fn with_hashes(m: usize, k: usize) -> Self {
        Self {
            bits: bitvec![u64, Lsb0; 0; m.max(1)],
            k: k.max(1),
            n: 0,
        }
    }

    /// Size in bits.
    pub fn size_bits(&self) -> usize {
        self.bits.len()
    }

    /// Probe count.
    pub fn hash_count(&self) -> usize {
        self.k
    }

    /// Number of inserted elements.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Reset every bit.
    pub fn clear(&mut self) {
        self.bits.fill(false);
        self.n = 0;
    }

    pub fn insert(&mut self, element: &str) {
        let m = self.bits.len();
        for pos in probe_positions(element.as_bytes(), self.k, m) {
            self.bits.set(pos, true);
        }
        self.n += 1;
    }

    /// False means definitely absent; true means possibly present.
    pub fn might_contain(&self, element: &str) -> bool {
        let m = self.bits.len();
        probe_positions(element.as_bytes(), self.k, m).all(|pos| self.bits[pos])
    }

    /// Theoretical false positive rate for the current load:
    /// `(1 - e^(-k*n/m))^k`.
    pub fn expected_false_positive_rate(&self) -> f64 {
        let k = self.k as f64;
        let n = self.n as f64;
        let m = self.bits.len() as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }
}

/// Positions `(h1 + i * h2) mod m` for `i in 0..k`, with `h2` forced odd.
fn probe_positions(element: &[u8], k: usize, m: usize) -> impl Iterator<Item = usize> {
    let h1 = murmur_hash(element, 0);
    let h2 = murmur_hash(element, 1) | 1;
    let m = m as u64;

    (0..k as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % m) as usize)
}

/// Lower 64 bits of MurmurHash3 x64/128.
fn murmur_hash(element: &[u8], seed: u32) -> u64 {
    let mut cursor = Cursor::new(element);
    // Reading from an in-memory cursor cannot fail
    murmur3::murmur3_x64_128(&mut cursor, seed).unwrap_or(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inserted_elements_found() {
        let mut filter = BloomFilter::new(1024);
        filter.insert("250990000000001");
        filter.insert("250990000000002");

        assert!(filter.might_contain("250990000000001"));
        assert!(filter.might_contain("250990000000002"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::new(1024);
        assert!(!filter.might_contain("250990000000001"));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut filter = BloomFilter::new(256);
        filter.insert("250990000000001");
        filter.clear();

        assert!(!filter.might_contain("250990000000001"));
        assert_eq!(filter.len(), 0);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let mut filter = BloomFilter::new(0);
        assert_eq!(filter.size_bits(), 1);

        filter.insert("250990000000001");
        assert!(filter.might_contain("250990000000001"));
    }

    #[test]
    fn test_probe_positions_in_bounds_and_varied() {
        let positions: Vec<usize> = probe_positions(b"250991234567890", HASH_COUNT, 10_000).collect();
        assert_eq!(positions.len(), HASH_COUNT);
        assert!(positions.iter().all(|&p| p < 10_000));

        let unique: std::collections::HashSet<_> = positions.iter().collect();
        assert!(unique.len() >= 3);
    }

    #[test]
    fn test_expected_fpr_grows_with_load() {
        let mut filter = BloomFilter::new(1000);
        assert_eq!(filter.expected_false_positive_rate(), 0.0);

        for i in 0..100 {
            filter.insert(&format!("25099{:010}", i));
        }
        let light = filter.expected_false_positive_rate();

        for i in 100..300 {
            filter.insert(&format!("25099{:010}", i));
        }
        assert!(filter.expected_false_positive_rate() > light);
    }
}

//! Bounded-memory approximate set used for name and address deduplication.
//!
//! A stable Bloom filter: a fixed array of one-bit cells where every
//! insertion first clears a small number of randomly chosen cells. The
//! filter never grows, keeps its false-positive rate near the configured
//! target, and tolerates rare re-emission of very old entries in exchange.
//! All access goes through an internal lock; watchers and the sweep
//! generator share one instance freely.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::Mutex;

use rand::Rng;

/// Default cell count used by the enumeration filters.
pub const DEFAULT_FILTER_CELLS: usize = 1_000_000;

/// Default false-positive target.
pub const DEFAULT_FP_RATE: f64 = 0.01;

pub struct StableBloomFilter {
    inner: Mutex<Inner>,
    cells: usize,
    hashes: u32,
    decrements: usize,
    /// Set-cell count at which decay starts; below it the filter behaves
    /// like a plain Bloom filter and recent entries are never lost.
    stable_ones: usize,
}

struct Inner {
    bits: Vec<u64>,
    ones: usize,
}

impl StableBloomFilter {
    /// A filter with `cells` one-bit cells targeting the given
    /// false-positive rate.
    pub fn new(cells: usize, fp_rate: f64) -> Self {
        let cells = cells.max(64);
        let hashes = optimal_hashes(fp_rate);
        let decrements = optimal_decrements(cells, hashes, fp_rate);
        let stable_ones = (cells as f64 * fp_rate.powf(1.0 / hashes as f64)) as usize;
        Self {
            inner: Mutex::new(Inner {
                bits: vec![0u64; cells.div_ceil(64)],
                ones: 0,
            }),
            cells,
            hashes,
            decrements,
            stable_ones,
        }
    }

    /// The filter sizing used throughout the enumeration.
    pub fn new_default() -> Self {
        Self::new(DEFAULT_FILTER_CELLS, DEFAULT_FP_RATE)
    }

    /// True when the key is (probably) present.
    pub fn test(&self, key: &[u8]) -> bool {
        let inner = self.inner.lock().expect("filter lock");
        self.indices(key).all(|i| get_bit(&inner.bits, i))
    }

    /// Insert the key, decaying a few random cells first once the filter
    /// is at its stable load.
    pub fn add(&self, key: &[u8]) {
        let mut inner = self.inner.lock().expect("filter lock");
        self.decay(&mut inner);
        for i in self.indices(key) {
            if set_bit(&mut inner.bits, i) {
                inner.ones += 1;
            }
        }
    }

    /// Insert the key and report whether it was already present.
    pub fn test_and_add(&self, key: &[u8]) -> bool {
        let mut inner = self.inner.lock().expect("filter lock");
        let present = self.indices(key).all(|i| get_bit(&inner.bits, i));
        self.decay(&mut inner);
        for i in self.indices(key) {
            if set_bit(&mut inner.bits, i) {
                inner.ones += 1;
            }
        }
        present
    }

    /// Clear every cell.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("filter lock");
        inner.bits.fill(0);
        inner.ones = 0;
    }

    fn decay(&self, inner: &mut Inner) {
        if inner.ones < self.stable_ones {
            return;
        }
        let mut rng = rand::rng();
        for _ in 0..self.decrements {
            let i = rng.random_range(0..self.cells);
            if clear_bit(&mut inner.bits, i) {
                inner.ones -= 1;
            }
        }
    }

    fn indices(&self, key: &[u8]) -> impl Iterator<Item = usize> {
        // Kirsch-Mitzenmacher double hashing over two seeded SipHash runs.
        let mut h = DefaultHasher::new();
        h.write_u64(0x51_73_74_61);
        h.write(key);
        let h1 = h.finish();

        let mut h = DefaultHasher::new();
        h.write_u64(0x62_6c_6f_6f);
        h.write(key);
        let h2 = h.finish() | 1;

        let cells = self.cells as u64;
        (0..self.hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % cells) as usize)
    }
}

fn optimal_hashes(fp_rate: f64) -> u32 {
    let k = (1.0 / fp_rate).log2().ceil();
    (k as u32).max(1)
}

/// Cells to decay per insertion so the fraction of set cells stabilizes at
/// the configured false-positive target (Deng & Rafiei, one-bit cells).
fn optimal_decrements(cells: usize, hashes: u32, fp_rate: f64) -> usize {
    let k = hashes as f64;
    let m = cells as f64;
    let sub = 1.0 - fp_rate.powf(1.0 / k);
    let denom = (1.0 / sub - 1.0) * (1.0 / k - 1.0 / m);
    if denom <= 0.0 {
        return 1;
    }
    ((1.0 / denom) as usize).max(1)
}

fn get_bit(bits: &[u64], i: usize) -> bool {
    bits[i / 64] & (1 << (i % 64)) != 0
}

/// Returns true when the bit was previously clear.
fn set_bit(bits: &mut [u64], i: usize) -> bool {
    let was = get_bit(bits, i);
    bits[i / 64] |= 1 << (i % 64);
    !was
}

/// Returns true when the bit was previously set.
fn clear_bit(bits: &mut [u64], i: usize) -> bool {
    let was = get_bit(bits, i);
    bits[i / 64] &= !(1 << (i % 64));
    was
}

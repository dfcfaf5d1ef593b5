//! Fixed-size bit sets for dataflow facts

use std::fmt;

/// A set of small integers backed by 64-bit words
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Empty set over `0..len`
    pub fn new(len: usize) -> Self {
        BitSet {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    /// Full set over `0..len`
    pub fn full(len: usize) -> Self {
        let mut set = Self::new(len);
        set.fill();
        set
    }

    /// Universe size
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the universe is empty
    pub fn is_universe_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether no bit is set
    pub fn is_clear(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Test a bit
    pub fn contains(&self, bit: usize) -> bool {
        bit < self.len && self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    /// Set a bit; returns whether it changed
    pub fn insert(&mut self, bit: usize) -> bool {
        if bit >= self.len {
            return false;
        }
        let (w, mask) = (bit / 64, 1u64 << (bit % 64));
        let changed = self.words[w] & mask == 0;
        self.words[w] |= mask;
        changed
    }

    /// Clear a bit; returns whether it changed
    pub fn remove(&mut self, bit: usize) -> bool {
        if bit >= self.len {
            return false;
        }
        let (w, mask) = (bit / 64, 1u64 << (bit % 64));
        let changed = self.words[w] & mask != 0;
        self.words[w] &= !mask;
        changed
    }

    /// Set every bit in the universe
    pub fn fill(&mut self) {
        for w in &mut self.words {
            *w = u64::MAX;
        }
        let tail = self.len % 64;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
    }

    /// Clear every bit
    pub fn clear(&mut self) {
        for w in &mut self.words {
            *w = 0;
        }
    }

    /// `self |= other`; returns whether `self` changed
    pub fn union_with(&mut self, other: &BitSet) -> bool {
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let merged = *a | *b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// `self &= other`; returns whether `self` changed
    pub fn intersect_with(&mut self, other: &BitSet) -> bool {
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let merged = *a & *b;
            changed |= merged != *a;
            *a = merged;
        }
        changed
    }

    /// `self &= !other`
    pub fn subtract(&mut self, other: &BitSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !*b;
        }
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set bits in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some(i * 64 + bit)
            })
        })
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

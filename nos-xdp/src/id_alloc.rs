//! Cyclic memory model id allocator
//!
//! Ids are handed out in increasing order starting after the last one
//! issued, wrapping back to the bottom of the range once the top has no free
//! slot left. Cycling keeps a freshly released id out of circulation for as
//! long as possible.
//!
//! The allocator is not synchronized; the registry only touches it while
//! holding its mutation lock.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::mem::{MemId, MEM_ID_MAX, MEM_ID_MIN};

const WORD_BITS: u32 = u64::BITS;

/// Bitmap backed id pool over an inclusive range.
#[derive(Debug)]
pub struct MemIdAllocator {
    /// One bit per id, bit `n` is id `min + n`
    bitmap: Vec<u64>,
    min: MemId,
    max: MemId,
    /// Where the next search starts
    next: MemId,
    in_use: usize,
}

impl MemIdAllocator {
    /// Create an allocator for ids in `[min, max]`.
    ///
    /// The range is clamped to `[MEM_ID_MIN, MEM_ID_MAX]`. An empty range
    /// gives an allocator that is always exhausted.
    pub fn new(min: MemId, max: MemId) -> Self {
        let min = min.max(MEM_ID_MIN);
        // `max` ends up one below `min` for an empty range.
        let max = max.min(MEM_ID_MAX).max(min - 1);
        let slots = (max + 1 - min) as usize;
        let words = slots.div_ceil(WORD_BITS as usize);
        Self {
            bitmap: vec![0; words],
            min,
            max,
            next: min,
            in_use: 0,
        }
    }

    /// Acquire an unused id.
    ///
    /// The search starts at the id following the last one issued. If nothing
    /// is free above it the search restarts once from the bottom of the range.
    pub fn acquire(&mut self) -> Result<MemId> {
        let mut retries = 1;
        loop {
            if let Some(id) = self.find_free_from(self.next) {
                self.set(id);
                self.next = id + 1;
                return Ok(id);
            }
            if retries == 0 {
                return Err(Error::Exhausted);
            }
            retries -= 1;
            self.next = self.min;
        }
    }

    /// Return an id to the pool
    pub fn release(&mut self, id: MemId) {
        if !self.is_allocated(id) {
            xdp_warn!("mem id {} released while not allocated", id);
            return;
        }
        let (word, bit) = self.position(id);
        self.bitmap[word] &= !(1u64 << bit);
        self.in_use -= 1;
    }

    /// Whether `id` is currently issued
    pub fn is_allocated(&self, id: MemId) -> bool {
        if id < self.min || id > self.max {
            return false;
        }
        let (word, bit) = self.position(id);
        self.bitmap[word] & (1u64 << bit) != 0
    }

    /// Number of ids currently issued
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Number of ids this allocator can issue in total
    pub fn capacity(&self) -> usize {
        (self.max + 1 - self.min) as usize
    }

    fn set(&mut self, id: MemId) {
        let (word, bit) = self.position(id);
        self.bitmap[word] |= 1u64 << bit;
        self.in_use += 1;
    }

    fn position(&self, id: MemId) -> (usize, u32) {
        let offset = id - self.min;
        ((offset / WORD_BITS) as usize, offset % WORD_BITS)
    }

    /// Lowest free id in `[start, max]`
    fn find_free_from(&self, start: MemId) -> Option<MemId> {
        if start < self.min || start > self.max {
            return None;
        }
        let (mut word, bit) = self.position(start);
        // Treat the bits below `start` as taken in the first word.
        let mut taken = self.bitmap[word] | ((1u64 << bit) - 1);
        loop {
            if taken != u64::MAX {
                let offset = word as u32 * WORD_BITS + (!taken).trailing_zeros();
                let id = self.min + offset;
                // The last word may have slots past `max`.
                return (id <= self.max).then_some(id);
            }
            word += 1;
            if word == self.bitmap.len() {
                return None;
            }
            taken = self.bitmap[word];
        }
    }
}

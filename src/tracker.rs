//! Tracker slot allocation and hit-count access.
//!
//! Instrumentation and reading are separated by a hard barrier: slots are
//! allocated (and their probe source rendered) while the tree is built,
//! hit counts are only read once the instrumented program has finished.
//! The allocator is owned by one analysis session; nothing here is global.

use std::fs;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default name of the global array probes increment.
pub const DEFAULT_TRACKER_GLOBAL: &str = "$_dc_cov";

/// Hands out node sequence numbers and tracker slots for one file.
#[derive(Debug, Clone)]
pub struct TrackerAllocator {
    global: String,
    file_index: usize,
    next_slot: usize,
    next_node_nb: usize,
}

impl TrackerAllocator {
    pub fn new(file_index: usize) -> Self {
        Self::with_global(DEFAULT_TRACKER_GLOBAL, file_index)
    }

    pub fn with_global(global: impl Into<String>, file_index: usize) -> Self {
        Self {
            global: global.into(),
            file_index,
            next_slot: 0,
            next_node_nb: 0,
        }
    }

    /// Reserve a contiguous block of `count` slots.
    pub fn allocate(&mut self, count: usize) -> Range<usize> {
        let start = self.next_slot;
        self.next_slot += count;
        start..self.next_slot
    }

    /// Next node sequence number.
    pub fn create_node_nb(&mut self) -> usize {
        let nb = self.next_node_nb;
        self.next_node_nb += 1;
        nb
    }

    /// Ruby source that records one hit on `slot`.
    pub fn probe_source(&self, slot: usize) -> String {
        format!("{}[{}][{}]+=1", self.global, self.file_index, slot)
    }

    /// Source that must run before the instrumented file so probes have storage.
    pub fn setup_source(&self) -> String {
        format!(
            "({g}||=[])[{f}]||=Array.new({n},0)",
            g = self.global,
            f = self.file_index,
            n = self.next_slot
        )
    }

    pub fn file_index(&self) -> usize {
        self.file_index
    }

    pub fn global(&self) -> &str {
        &self.global
    }

    /// Total slots allocated so far.
    pub fn slot_count(&self) -> usize {
        self.next_slot
    }

    /// Total nodes numbered so far.
    pub fn node_count(&self) -> usize {
        self.next_node_nb
    }
}

/// Read side of the external tracking facility.
pub trait HitSource {
    /// Hit count for `slot`. A slot that was never reached reads as 0.
    fn hits(&self, slot: usize) -> u64;
}

/// Hit counts collected after execution, indexed by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HitCounts {
    counts: Vec<u64>,
}

impl HitCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    /// Load counts from a JSON array (`null` entries read as 0).
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let raw: Vec<Option<u64>> = serde_json::from_str(&content)?;
        Ok(Self::from_counts(
            raw.into_iter().map(|c| c.unwrap_or(0)).collect(),
        ))
    }

    pub fn set(&mut self, slot: usize, hits: u64) {
        if slot >= self.counts.len() {
            self.counts.resize(slot + 1, 0);
        }
        self.counts[slot] = hits;
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl HitSource for HitCounts {
    fn hits(&self, slot: usize) -> u64 {
        self.counts.get(slot).copied().unwrap_or(0)
    }
}

impl<T: HitSource + ?Sized> HitSource for &T {
    fn hits(&self, slot: usize) -> u64 {
        (**self).hits(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_contiguous() {
        let mut alloc = TrackerAllocator::new(3);
        assert_eq!(alloc.allocate(2), 0..2);
        assert_eq!(alloc.allocate(0), 2..2);
        assert_eq!(alloc.allocate(1), 2..3);
        assert_eq!(alloc.slot_count(), 3);
        assert_eq!(alloc.probe_source(2), "$_dc_cov[3][2]+=1");
        assert_eq!(alloc.setup_source(), "($_dc_cov||=[])[3]||=Array.new(3,0)");
    }

    #[test]
    fn test_node_numbers_increase() {
        let mut alloc = TrackerAllocator::new(0);
        assert_eq!(alloc.create_node_nb(), 0);
        assert_eq!(alloc.create_node_nb(), 1);
        assert_eq!(alloc.node_count(), 2);
    }

    #[test]
    fn test_missing_slots_read_as_zero() {
        let mut hits = HitCounts::new();
        hits.set(4, 7);
        assert_eq!(hits.hits(4), 7);
        assert_eq!(hits.hits(0), 0);
        assert_eq!(hits.hits(100), 0);
        assert_eq!(hits.len(), 5);
    }

    #[test]
    fn test_load_with_nulls() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("hits.json");
        std::fs::write(&path, "[1, null, 3]").unwrap();
        let hits = HitCounts::load(&path).unwrap();
        assert_eq!(hits.hits(0), 1);
        assert_eq!(hits.hits(1), 0);
        assert_eq!(hits.hits(2), 3);
    }
}

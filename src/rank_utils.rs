use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::Write;

use abomonation_derive::Abomonation;

use crate::records::NodeId;

/// A node's final rank, ordered so that "greater" means "ranks higher".
///
/// Equal ranks are broken by ascending id, so the smaller id ranks higher.
#[derive(Clone, Copy, Debug, Abomonation)]
pub struct RankedEntry {
    pub rank: f64,
    pub id: NodeId,
}

impl RankedEntry {
    pub fn new(id: NodeId, rank: f64) -> Self {
        RankedEntry { rank, id }
    }
}

impl PartialEq for RankedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedEntry {}

impl PartialOrd for RankedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .total_cmp(&other.rank)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Keeps the `capacity` highest entries offered so far.
///
/// The heap is ordered on `Reverse`, so its top is the weakest retained entry
/// and is the one evicted.
#[derive(Debug)]
pub struct TopK {
    capacity: usize,
    heap: BinaryHeap<Reverse<RankedEntry>>,
}

impl TopK {
    pub fn new(capacity: usize) -> Self {
        TopK {
            capacity,
            heap: BinaryHeap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn offer(&mut self, entry: RankedEntry) {
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(entry));
        } else if let Some(mut weakest) = self.heap.peek_mut() {
            if entry > weakest.0 {
                *weakest = Reverse(entry);
            }
        }
    }

    /// Retained entries, best first. Leaves the selection empty.
    pub fn drain_sorted(&mut self) -> Vec<RankedEntry> {
        std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(entry)| entry)
            .collect()
    }
}

impl Extend<RankedEntry> for TopK {
    fn extend<I: IntoIterator<Item = RankedEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.offer(entry);
        }
    }
}

/// Writes `id<TAB>rank` lines.
pub fn write_ranks<W: Write>(mut writer: W, ranks: &[RankedEntry]) -> std::io::Result<()> {
    for entry in ranks {
        writeln!(writer, "{}\t{}", entry.id, entry.rank)?;
    }
    writer.flush()
}

//! Binary min-heap over grid nodes, keyed by a score held in an external
//! per-node record table.
//!
//! The heap stores linear vertex indices only; comparisons read
//! `records[ix].score`. There is no decrease-key: a node is pushed once on
//! first discovery, and later score drops are written to the table in place.
//! The heap therefore holds at most one copy of each node.

use crate::grid::GridPos;

/// Dense per-node search record.
#[derive(Debug, Clone, Copy)]
pub struct NodeRecord {
    /// Predecessor on the cheapest known path; the sentinel `(size, size)`
    /// means "never reached".
    pub prev: GridPos,
    /// Cheapest known cost from the start.
    pub cost: f32,
    /// `cost` plus the heuristic; the heap key.
    pub score: f32,
}

impl NodeRecord {
    /// An unreached node for a grid of the given size.
    pub fn unreached(size: usize) -> Self {
        NodeRecord {
            prev: GridPos::new(size, size),
            cost: f32::INFINITY,
            score: f32::INFINITY,
        }
    }

    /// Whether this node has ever been discovered.
    pub fn reached(&self, size: usize) -> bool {
        self.prev.c != size
    }
}

#[derive(Debug, Default)]
pub struct MinHeap {
    nodes: Vec<usize>,
}

impl MinHeap {
    pub fn new() -> Self {
        MinHeap { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pushes a node and restores the heap order by sifting it up.
    pub fn push(&mut self, ix: usize, records: &[NodeRecord]) {
        self.nodes.push(ix);
        self.sift_up(self.nodes.len() - 1, records);
    }

    /// Pops the node with the smallest score.
    pub fn pop(&mut self, records: &[NodeRecord]) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }
        let last = self.nodes.len() - 1;
        self.nodes.swap(0, last);
        let top = self.nodes.pop();
        if !self.nodes.is_empty() {
            self.sift_down(0, records);
        }
        top
    }

    /// Smallest score currently on the heap, without popping.
    pub fn peek(&self) -> Option<usize> {
        self.nodes.first().copied()
    }

    fn sift_up(&mut self, mut at: usize, records: &[NodeRecord]) {
        while at > 0 {
            let parent = (at - 1) / 2;
            if records[self.nodes[at]].score < records[self.nodes[parent]].score {
                self.nodes.swap(at, parent);
                at = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut at: usize, records: &[NodeRecord]) {
        let len = self.nodes.len();
        loop {
            let left = at * 2 + 1;
            let right = at * 2 + 2;
            let mut smallest = at;

            if left < len
                && records[self.nodes[left]].score < records[self.nodes[smallest]].score
            {
                smallest = left;
            }
            if right < len
                && records[self.nodes[right]].score < records[self.nodes[smallest]].score
            {
                smallest = right;
            }
            if smallest == at {
                break;
            }
            self.nodes.swap(at, smallest);
            at = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records_with_scores(scores: &[f32]) -> Vec<NodeRecord> {
        scores
            .iter()
            .map(|&s| NodeRecord {
                prev: GridPos::new(0, 0),
                cost: s,
                score: s,
            })
            .collect()
    }

    #[test]
    fn pops_in_score_order() {
        let records = records_with_scores(&[5.0, 1.0, 4.0, 2.0, 3.0, 0.5]);
        let mut heap = MinHeap::new();
        for ix in 0..records.len() {
            heap.push(ix, &records);
        }

        let mut popped = Vec::new();
        while let Some(ix) = heap.pop(&records) {
            popped.push(records[ix].score);
        }
        assert_eq!(popped, vec![0.5, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn root_is_minimal_after_interleaved_ops() {
        // Pseudo-random but deterministic insert/pop interleaving.
        let scores: Vec<f32> = (0..64).map(|i| ((i * 37 + 11) % 64) as f32).collect();
        let records = records_with_scores(&scores);
        let mut heap = MinHeap::new();

        for (i, ix) in (0..records.len()).enumerate() {
            heap.push(ix, &records);
            if i % 3 == 2 {
                heap.pop(&records);
            }
            if let Some(root) = heap.peek() {
                for &other in &heap.nodes {
                    assert!(records[root].score <= records[other].score);
                }
            }
        }
    }

    #[test]
    fn pop_on_empty_is_none() {
        let records = records_with_scores(&[]);
        let mut heap = MinHeap::new();
        assert_eq!(heap.pop(&records), None);
        assert!(heap.is_empty());
    }
}

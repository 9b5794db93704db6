//! Chain discovery inside one chunk of accesses
//!
//! Every ordered pair of the chunk is tested for adjacency; each access keeps
//! at most one successor. Chains start at accesses nobody points to and follow
//! successor links from there.

use crate::ir::InstId;
use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use smallvec::SmallVec;

/// Accesses in ascending address order
pub type Chain = SmallVec<[InstId; 8]>;

/// Successor links between the accesses of one chunk, by chunk index
#[derive(Debug, Clone)]
pub struct ChainLinks {
    heads: IndexSet<usize, FxBuildHasher>,
    tails: IndexSet<usize, FxBuildHasher>,
    next: Vec<Option<usize>>,
}

impl ChainLinks {
    /// Link every `i` to the nearest following `j` with `consecutive(i, j)`
    pub fn build(len: usize, mut consecutive: impl FnMut(usize, usize) -> bool) -> Self {
        let mut links = Self {
            heads: IndexSet::default(),
            tails: IndexSet::default(),
            next: vec![None; len],
        };

        for i in 0..len {
            for j in (0..len).rev() {
                if i == j || !consecutive(i, j) {
                    continue;
                }
                if let Some(current) = links.next[i] {
                    let closer = j.abs_diff(i) < current.abs_diff(i);
                    if j < i || !closer {
                        continue;
                    }
                }
                links.tails.insert(j);
                links.heads.insert(i);
                links.next[i] = Some(j);
            }
        }
        links
    }

    /// Heads that are not the successor of anything, in discovery order
    pub fn chain_starts(&self) -> impl Iterator<Item = usize> + '_ {
        self.heads
            .iter()
            .copied()
            .filter(|head| !self.tails.contains(head))
    }

    pub fn successor(&self, index: usize) -> Option<usize> {
        self.next.get(index).copied().flatten()
    }

    /// Follow successor links from `start` until a consumed access
    pub fn walk(&self, start: usize, consumed: impl Fn(usize) -> bool) -> SmallVec<[usize; 8]> {
        let mut chain = SmallVec::new();
        let mut current = Some(start);
        while let Some(index) = current {
            if consumed(index) || chain.len() > self.next.len() {
                break;
            }
            chain.push(index);
            current = self.successor(index);
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accesses at the given element offsets; `i -> j` when `j` is one past `i`
    fn links_for(offsets: &[i64]) -> ChainLinks {
        ChainLinks::build(offsets.len(), |i, j| offsets[j] == offsets[i] + 1)
    }

    #[test]
    fn test_in_order_chain() {
        let links = links_for(&[0, 1, 2, 3]);
        let starts: Vec<_> = links.chain_starts().collect();
        assert_eq!(starts, vec![0]);
        assert_eq!(links.walk(0, |_| false).as_slice(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_reversed_program_order() {
        let links = links_for(&[3, 2, 1, 0]);
        let starts: Vec<_> = links.chain_starts().collect();
        assert_eq!(starts, vec![3]);
        assert_eq!(links.walk(3, |_| false).as_slice(), &[3, 2, 1, 0]);
    }

    #[test]
    fn test_duplicate_offsets_prefer_nearest_later() {
        // Two candidates for the successor of 0; the nearer later one wins
        let links = links_for(&[0, 5, 1, 1]);
        assert_eq!(links.successor(0), Some(2));
        let starts: Vec<_> = links.chain_starts().collect();
        assert_eq!(starts, vec![0]);
    }

    #[test]
    fn test_earlier_candidate_does_not_replace() {
        let links = links_for(&[1, 0, 1]);
        // Index 2 is seen first; index 0 lies before 1 and is ignored
        assert_eq!(links.successor(1), Some(2));
    }

    #[test]
    fn test_walk_stops_at_consumed() {
        let links = links_for(&[0, 1, 2, 3]);
        assert_eq!(links.walk(0, |i| i == 2).as_slice(), &[0, 1]);
        assert!(links.walk(0, |i| i == 0).is_empty());
    }

    #[test]
    fn test_separate_chains() {
        let links = links_for(&[0, 10, 1, 11]);
        let starts: Vec<_> = links.chain_starts().collect();
        assert_eq!(starts, vec![0, 1]);
        assert_eq!(links.walk(1, |_| false).as_slice(), &[1, 3]);
        assert_eq!(links.successor(2), None);
    }
}

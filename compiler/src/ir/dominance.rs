//! Dominance and block ordering
//!
//! - Block orderings (post-order, reverse post-order) from the entry block
//! - Dominator tree computation (iterative dataflow algorithm)

use super::{IrBlockId, IrControlFlowGraph, IrFunction};
use std::collections::{HashMap, HashSet, VecDeque};

/// Blocks reachable from the entry, in post-order.
///
/// Successors are visited in terminator order, so the result is deterministic.
pub fn post_order(cfg: &IrControlFlowGraph) -> Vec<IrBlockId> {
    let mut visited = HashSet::new();
    let mut postorder = Vec::new();
    // Explicit stack so deep CFGs cannot overflow the native one
    let mut stack: Vec<(IrBlockId, Vec<IrBlockId>)> = Vec::new();

    let entry = cfg.entry_block;
    if cfg.get_block(entry).is_none() {
        return postorder;
    }
    visited.insert(entry);
    stack.push((entry, successors_rev(cfg, entry)));

    while let Some((block, pending)) = stack.last_mut() {
        match pending.pop() {
            Some(succ) => {
                if cfg.get_block(succ).is_some() && visited.insert(succ) {
                    let succs = successors_rev(cfg, succ);
                    stack.push((succ, succs));
                }
            }
            None => {
                postorder.push(*block);
                stack.pop();
            }
        }
    }

    postorder
}

fn successors_rev(cfg: &IrControlFlowGraph, block: IrBlockId) -> Vec<IrBlockId> {
    let mut succs = cfg
        .get_block(block)
        .map(|b| b.successors())
        .unwrap_or_default();
    succs.reverse();
    succs
}

/// Blocks reachable from the entry, in reverse post-order.
pub fn reverse_postorder(cfg: &IrControlFlowGraph) -> Vec<IrBlockId> {
    let mut order = post_order(cfg);
    order.reverse();
    order
}

/// Dominator tree for a function's control flow graph.
///
/// A block D dominates block B if every path from the entry to B goes through D.
/// The immediate dominator (idom) of B is the closest strict dominator.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Immediate dominator for each block (entry block has no idom)
    idom: HashMap<IrBlockId, IrBlockId>,

    /// Children in the dominator tree
    children: HashMap<IrBlockId, Vec<IrBlockId>>,

    /// Dominator tree depth for each block (entry = 0)
    depth: HashMap<IrBlockId, usize>,

    /// Blocks reachable from the entry
    reachable: HashSet<IrBlockId>,

    /// Entry block of the function
    entry: IrBlockId,
}

impl DominatorTree {
    /// Compute the dominator tree for a function.
    ///
    /// Cooper, Harvey and Kennedy's iterative algorithm over reverse post-order.
    pub fn compute(function: &IrFunction) -> Self {
        let cfg = &function.cfg;
        let entry = cfg.entry_block;
        let preds = cfg.predecessors();

        let rpo = reverse_postorder(cfg);
        let rpo_index: HashMap<IrBlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut idom: HashMap<IrBlockId, Option<IrBlockId>> =
            rpo.iter().map(|&b| (b, None)).collect();
        idom.insert(entry, Some(entry));

        let mut changed = true;
        while changed {
            changed = false;

            for &block in &rpo {
                if block == entry {
                    continue;
                }

                let mut new_idom: Option<IrBlockId> = None;
                for &pred in preds.get(&block).map(Vec::as_slice).unwrap_or(&[]) {
                    if idom.get(&pred).and_then(|x| *x).is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(current, pred, &idom, &rpo_index),
                    });
                }

                if new_idom != idom.get(&block).copied().flatten() {
                    idom.insert(block, new_idom);
                    changed = true;
                }
            }
        }

        let final_idom: HashMap<IrBlockId, IrBlockId> = idom
            .iter()
            .filter(|(&block, _)| block != entry)
            .filter_map(|(&block, &dom)| dom.map(|d| (block, d)))
            .collect();

        let mut children: HashMap<IrBlockId, Vec<IrBlockId>> = HashMap::new();
        for (&block, &dom) in &final_idom {
            children.entry(dom).or_default().push(block);
        }
        for list in children.values_mut() {
            list.sort();
        }

        let mut depth: HashMap<IrBlockId, usize> = HashMap::new();
        depth.insert(entry, 0);
        let mut queue: VecDeque<IrBlockId> = VecDeque::new();
        queue.push_back(entry);
        while let Some(block) = queue.pop_front() {
            let d = depth[&block];
            for &child in children.get(&block).map(Vec::as_slice).unwrap_or(&[]) {
                depth.insert(child, d + 1);
                queue.push_back(child);
            }
        }

        Self {
            idom: final_idom,
            children,
            depth,
            reachable: rpo.into_iter().collect(),
            entry,
        }
    }

    /// Find intersection of two dominators in the dominator tree.
    fn intersect(
        mut b1: IrBlockId,
        mut b2: IrBlockId,
        idom: &HashMap<IrBlockId, Option<IrBlockId>>,
        rpo_index: &HashMap<IrBlockId, usize>,
    ) -> IrBlockId {
        let index = |b: &IrBlockId| rpo_index.get(b).copied().unwrap_or(usize::MAX);
        while b1 != b2 {
            while index(&b1) > index(&b2) {
                match idom.get(&b1) {
                    Some(Some(dom)) if *dom != b1 => b1 = *dom,
                    _ => return b1,
                }
            }
            while index(&b2) > index(&b1) {
                match idom.get(&b2) {
                    Some(Some(dom)) if *dom != b2 => b2 = *dom,
                    _ => return b2,
                }
            }
        }
        b1
    }

    /// Get the immediate dominator of a block.
    pub fn idom(&self, block: IrBlockId) -> Option<IrBlockId> {
        self.idom.get(&block).copied()
    }

    /// Get children of a block in the dominator tree.
    pub fn children(&self, block: IrBlockId) -> &[IrBlockId] {
        self.children.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Get the depth of a block in the dominator tree.
    pub fn depth(&self, block: IrBlockId) -> usize {
        self.depth.get(&block).copied().unwrap_or(0)
    }

    pub fn is_reachable(&self, block: IrBlockId) -> bool {
        self.reachable.contains(&block)
    }

    /// Check if block A dominates block B.
    ///
    /// Unreachable blocks are dominated by every block.
    pub fn dominates(&self, a: IrBlockId, b: IrBlockId) -> bool {
        if a == b || !self.is_reachable(b) {
            return true;
        }

        let mut current = b;
        while let Some(dom) = self.idom.get(&current) {
            if *dom == a {
                return true;
            }
            current = *dom;
        }

        a == self.entry
    }

    /// Check if block A strictly dominates block B (A dominates B and A != B).
    pub fn strictly_dominates(&self, a: IrBlockId, b: IrBlockId) -> bool {
        a != b && self.dominates(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, IrFunctionId, IrType};

    /// entry -> {bb1, bb2} -> bb3
    fn diamond() -> (IrFunction, [IrBlockId; 3]) {
        let mut func = IrFunction::new(IrFunctionId(0), "diamond", IrType::Void);
        let mut b = FunctionBuilder::new(&mut func);
        let cond = b.build_const(crate::ir::IrValue::Bool(true), IrType::Bool).unwrap();
        let bb1 = b.create_block();
        let bb2 = b.create_block();
        let bb3 = b.create_block();
        b.build_cond_branch(cond, bb1, bb2).unwrap();
        b.switch_to_block(bb1);
        b.build_branch(bb3).unwrap();
        b.switch_to_block(bb2);
        b.build_branch(bb3).unwrap();
        b.switch_to_block(bb3);
        b.build_return(None).unwrap();
        (func, [bb1, bb2, bb3])
    }

    #[test]
    fn test_dominator_tree_simple() {
        let (function, [bb1, bb2, bb3]) = diamond();
        let domtree = DominatorTree::compute(&function);

        assert!(domtree.dominates(IrBlockId::entry(), bb1));
        assert!(domtree.dominates(IrBlockId::entry(), bb3));
        assert!(!domtree.dominates(bb1, bb2));
        assert!(!domtree.dominates(bb2, bb1));
        assert!(!domtree.dominates(bb1, bb3));
        assert_eq!(domtree.idom(bb3), Some(IrBlockId::entry()));
        assert_eq!(domtree.depth(bb3), 1);
        assert_eq!(domtree.children(IrBlockId::entry()), &[bb1, bb2, bb3]);
    }

    #[test]
    fn test_post_order_visits_successors_first() {
        let (function, [bb1, bb2, bb3]) = diamond();
        let order = post_order(&function.cfg);
        assert_eq!(order, vec![bb3, bb1, bb2, IrBlockId::entry()]);
        assert_eq!(reverse_postorder(&function.cfg).first(), Some(&IrBlockId::entry()));
    }

    #[test]
    fn test_unreachable_block_is_dominated() {
        let (mut function, [bb1, ..]) = diamond();
        let dead = function.cfg.create_block();
        let domtree = DominatorTree::compute(&function);
        assert!(!domtree.is_reachable(dead));
        assert!(domtree.dominates(bb1, dead));
    }
}

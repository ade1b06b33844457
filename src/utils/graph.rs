//! Generic traversals over rooted directed graphs.
//!
//! The control-flow graph of a [`crate::graph::Graph`] is exposed to these
//! algorithms through the [`Successors`] trait using plain `usize` indices, which
//! keeps the algorithms independent of block storage (deleted blocks simply have
//! no successors and are never reached).
//!
//! - [`pre_order`] - depth-first pre-order (a node precedes everything it reaches first)
//! - [`post_order`] - depth-first post-order
//! - [`reverse_post_order`] - the canonical order for forward data-flow problems

use crate::utils::BitSet;

/// A directed graph whose nodes are the indices `0..node_count()`.
pub trait Successors {
    /// Number of node slots (including empty slots).
    fn node_count(&self) -> usize;

    /// Successors of `node`, in a stable order.
    fn successors(&self, node: usize) -> impl Iterator<Item = usize> + '_;
}

enum Visit {
    Pre(usize),
    Post(usize),
}

fn depth_first<G: Successors>(graph: &G, entry: usize, mut visit: impl FnMut(Visit)) {
    let count = graph.node_count();
    if entry >= count {
        return;
    }

    let mut seen = BitSet::new(count);
    let mut stack = vec![Visit::Pre(entry)];

    while let Some(item) = stack.pop() {
        match item {
            Visit::Pre(node) => {
                if !seen.insert(node) {
                    continue;
                }
                visit(Visit::Pre(node));
                stack.push(Visit::Post(node));

                // Reverse so the first successor is explored first.
                let successors: Vec<usize> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if succ < count && !seen.contains(succ) {
                        stack.push(Visit::Pre(succ));
                    }
                }
            }
            Visit::Post(node) => visit(Visit::Post(node)),
        }
    }
}

/// Nodes reachable from `entry` in depth-first pre-order.
#[must_use]
pub fn pre_order<G: Successors>(graph: &G, entry: usize) -> Vec<usize> {
    let mut order = Vec::new();
    depth_first(graph, entry, |visit| {
        if let Visit::Pre(node) = visit {
            order.push(node);
        }
    });
    order
}

/// Nodes reachable from `entry` in depth-first post-order.
#[must_use]
pub fn post_order<G: Successors>(graph: &G, entry: usize) -> Vec<usize> {
    let mut order = Vec::new();
    depth_first(graph, entry, |visit| {
        if let Visit::Post(node) = visit {
            order.push(node);
        }
    });
    order
}

/// Nodes reachable from `entry` in reverse post-order.
#[must_use]
pub fn reverse_post_order<G: Successors>(graph: &G, entry: usize) -> Vec<usize> {
    let mut order = post_order(graph, entry);
    order.reverse();
    order
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Adjacency-list graph used by the utility tests.
    pub(crate) struct AdjacencyGraph(pub Vec<Vec<usize>>);

    impl Successors for AdjacencyGraph {
        fn node_count(&self) -> usize {
            self.0.len()
        }

        fn successors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
            self.0[node].iter().copied()
        }
    }

    #[test]
    fn test_orders_on_diamond() {
        // 0 -> 1 -> 3, 0 -> 2 -> 3
        let g = AdjacencyGraph(vec![vec![1, 2], vec![3], vec![3], vec![]]);

        assert_eq!(pre_order(&g, 0), vec![0, 1, 3, 2]);
        assert_eq!(post_order(&g, 0), vec![3, 1, 2, 0]);
        assert_eq!(reverse_post_order(&g, 0), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_unreachable_nodes_are_skipped() {
        let g = AdjacencyGraph(vec![vec![1], vec![], vec![1]]);
        assert_eq!(pre_order(&g, 0), vec![0, 1]);
    }
}

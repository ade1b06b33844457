//! SSA liveness and the kill points derived from it.
//!
//! Liveness is a backward fixpoint over node values. An `Upsilon` defines the shadow
//! of its `Phi`, so walking backward past an `Upsilon` ends the `Phi`'s liveness in
//! the predecessor; the `Phi` itself defines nothing and stays live up to the head of
//! its own block.

use std::collections::BTreeSet;

use crate::{
    graph::{BlockIndex, Graph, NodeId, Op},
    Result,
};

/// Computes `live_at_head` and `live_at_tail` for every block.
pub fn compute_liveness(graph: &mut Graph) -> Result<()> {
    for block in graph.blocks_mut() {
        block.ssa.live_at_head.clear();
        block.ssa.live_at_tail.clear();
    }

    let order = graph.blocks_in_post_order();
    let mut changed = true;
    while changed {
        changed = false;
        for &index in &order {
            let mut live = BTreeSet::new();
            for successor in graph.successors_of(index) {
                if let Some(block) = graph.block(successor) {
                    live.extend(block.ssa.live_at_head.iter().copied());
                }
            }
            let tail = live.clone();

            let block = graph.try_block(index)?;
            for &id in block.nodes.iter().rev() {
                let node = graph.node(id);
                match node.op {
                    Op::Upsilon { phi } => {
                        live.remove(&phi);
                    }
                    Op::Phi => continue,
                    _ => {
                        live.remove(&id);
                    }
                }
                live.extend(node.children.iter().map(|edge| edge.node));
            }

            let block = graph.try_block_mut(index)?;
            if block.ssa.live_at_tail != tail {
                block.ssa.live_at_tail = tail;
                changed = true;
            }
            if block.ssa.live_at_head != live {
                block.ssa.live_at_head = live;
                changed = true;
            }
        }
    }
    Ok(())
}

/// Calls `functor(index, node)` for every node whose last use in `block` precedes
/// position `index`. Nodes live at the tail are reported at `block.len()`.
///
/// Kills at index 0 are never reported: nothing precedes them.
pub fn for_all_kills_in_block(
    graph: &Graph,
    block: BlockIndex,
    mut functor: impl FnMut(usize, NodeId),
) -> Result<()> {
    let data = graph.try_block(block)?;
    for &node in &data.ssa.live_at_tail {
        functor(data.len(), node);
    }

    let mut live = data.ssa.live_at_tail.clone();
    let mut kills: Vec<(usize, NodeId)> = Vec::new();
    for (index, &id) in data.nodes.iter().enumerate().rev() {
        let node = graph.node(id);
        match node.op {
            Op::Upsilon { phi } => {
                live.remove(&phi);
            }
            Op::Phi => {}
            _ => {
                live.remove(&id);
            }
        }
        for edge in &node.children {
            if live.insert(edge.node) && index > 0 {
                kills.push((index, edge.node));
            }
        }
    }

    kills.reverse();
    for (index, node) in kills {
        functor(index, node);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, NodeOrigin, UseKind};

    #[test]
    fn test_straight_line_kills() {
        let mut graph = Graph::new(1, 0);
        let block = graph.add_block();
        let origin = NodeOrigin::default();
        let a = graph.add_node(Op::GetArgumentCount, vec![], origin);
        let b = graph.add_node(Op::GetCallee, vec![], origin);
        let check = graph.add_node(Op::Check, vec![Edge::new(a, UseKind::Int32)], origin);
        let ret = graph.add_node(Op::Return, vec![Edge::untyped(b)], origin);
        for node in [a, b, check, ret] {
            graph.append(block, node).unwrap();
        }
        compute_liveness(&mut graph).unwrap();

        let mut kills = Vec::new();
        for_all_kills_in_block(&graph, block, |index, node| kills.push((index, node))).unwrap();
        assert_eq!(kills, vec![(2, a), (3, b)]);
        assert!(graph.block(block).unwrap().ssa.live_at_head.is_empty());
    }
}

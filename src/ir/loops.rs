//! Natural-loop discovery from CFG back edges, once a [`DominatorTree`] is
//! available.

use std::collections::HashMap;
use std::collections::HashSet;

use cranelift_entity::packed_option::PackedOption;
use cranelift_entity::{entity_impl, PrimaryMap, SecondaryMap};
use log::debug;

use super::cfg::ControlFlowGraph;
use super::dominator_tree::DominatorTree;
use super::entities::Block;
use super::function::Function;

/// An opaque reference to a natural loop in a [`LoopForest`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loop(u32);
entity_impl!(Loop, "loop");

#[derive(Clone, Debug, Default)]
struct LoopData {
    header: Block,
    body: HashSet<Block>,
    parent: PackedOption<Loop>,
    depth: u32,
}

/// The set of natural loops in a function, nested by dominance +
/// body-subset inclusion.
#[derive(Clone, Debug, Default)]
pub struct LoopForest {
    loops: PrimaryMap<Loop, LoopData>,
    block_to_loop: SecondaryMap<Block, PackedOption<Loop>>,
}

impl LoopForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.loops.clear();
        self.block_to_loop.clear();
    }

    /// Recompute from `cfg` and `domtree`, discarding any previous forest.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph, domtree: &DominatorTree) {
        self.clear();
        let mut header_to_loop: HashMap<Block, Loop> = HashMap::new();

        for u in func.layout.blocks() {
            if !domtree.is_reachable(u) {
                continue;
            }
            for &v in cfg.successors(u) {
                if domtree.is_reachable(v) && domtree.dominates(v, u) {
                    let lp = *header_to_loop.entry(v).or_insert_with(|| {
                        debug!("back edge {u} -> {v} establishes a loop header at {v}");
                        self.loops.push(LoopData {
                            header: v,
                            body: HashSet::new(),
                            parent: None.into(),
                            depth: 0,
                        })
                    });
                    self.grow_body(lp, v, u, cfg, domtree);
                }
            }
        }

        self.assign_parents_and_depths(domtree);
        self.assign_innermost_loops();
        debug!("discovered {} natural loop(s)", self.loops.len());
    }

    /// Step 3 of natural-loop construction: worklist from `{header, tail}`,
    /// pulling in any predecessor of a popped block that `header` dominates.
    fn grow_body(&mut self, lp: Loop, header: Block, tail: Block, cfg: &ControlFlowGraph, domtree: &DominatorTree) {
        let mut worklist = Vec::new();
        if self.loops[lp].body.insert(header) {
            worklist.push(header);
        }
        if self.loops[lp].body.insert(tail) {
            worklist.push(tail);
        }
        while let Some(b) = worklist.pop() {
            for pred in cfg.pred_blocks(b) {
                if domtree.dominates(header, pred) && self.loops[lp].body.insert(pred) {
                    worklist.push(pred);
                }
            }
        }
    }

    fn assign_parents_and_depths(&mut self, domtree: &DominatorTree) {
        let handles: Vec<Loop> = self.loops.keys().collect();
        for &l in &handles {
            let mut parent = None;
            let mut parent_size = usize::MAX;
            for &candidate in &handles {
                if candidate == l {
                    continue;
                }
                let bigger = self.loops[candidate].body.len() > self.loops[l].body.len();
                let encloses = bigger
                    && domtree.dominates(self.loops[candidate].header, self.loops[l].header)
                    && self.loops[l].body.is_subset(&self.loops[candidate].body);
                if encloses && self.loops[candidate].body.len() < parent_size {
                    parent = Some(candidate);
                    parent_size = self.loops[candidate].body.len();
                }
            }
            self.loops[l].parent = parent.into();
        }

        for &l in &handles {
            let mut depth = 0;
            let mut cur = self.loops[l].parent.expand();
            while let Some(p) = cur {
                depth += 1;
                cur = self.loops[p].parent.expand();
            }
            self.loops[l].depth = depth;
        }
    }

    fn assign_innermost_loops(&mut self) {
        let handles: Vec<Loop> = self.loops.keys().collect();
        let mut best: HashMap<Block, (u32, Loop)> = HashMap::new();
        for &l in &handles {
            let depth = self.loops[l].depth;
            for &b in &self.loops[l].body {
                best.entry(b)
                    .and_modify(|slot| {
                        if depth > slot.0 {
                            *slot = (depth, l);
                        }
                    })
                    .or_insert((depth, l));
            }
        }
        for (b, (_, l)) in best {
            self.block_to_loop[b] = l.into();
        }
    }

    pub fn get_loop(&self, block: Block) -> Option<Loop> {
        self.block_to_loop[block].expand()
    }

    pub fn loop_depth(&self, block: Block) -> u32 {
        self.get_loop(block).map_or(0, |l| self.loops[l].depth + 1)
    }

    pub fn is_loop_header(&self, block: Block) -> bool {
        self.get_loop(block).is_some_and(|l| self.loops[l].header == block)
    }

    pub fn header(&self, lp: Loop) -> Block {
        self.loops[lp].header
    }

    pub fn body(&self, lp: Loop) -> impl Iterator<Item = Block> + '_ {
        self.loops[lp].body.iter().copied()
    }

    pub fn parent(&self, lp: Loop) -> Option<Loop> {
        self.loops[lp].parent.expand()
    }

    pub fn depth(&self, lp: Loop) -> u32 {
        self.loops[lp].depth
    }

    /// Iterate over every loop in discovery order (the order its header's
    /// first back edge was encountered while scanning the layout).
    pub fn loops(&self) -> impl Iterator<Item = Loop> + '_ {
        self.loops.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::InstructionData;
    use crate::ir::sidetables::Signature;
    use crate::types::Type;

    fn jump(func: &mut Function, from: Block, to: Block) {
        let call = func.dfg.block_call(to, &[]);
        let inst = func.dfg.make_inst(InstructionData::Jump { dest: call });
        func.layout.append_inst(inst, from);
    }

    /// `b0 -> b1 -> b2 -> b1`, `b2 -> b3`, `b3: return`.
    #[test]
    fn simple_loop_has_header_b1_and_body_b1_b2() {
        let mut func = Function::new("f", Signature::default());
        let b0 = func.dfg.make_block();
        let b1 = func.dfg.make_block();
        let b2 = func.dfg.make_block();
        let b3 = func.dfg.make_block();
        for b in [b0, b1, b2, b3] {
            func.layout.append_block(b);
        }
        jump(&mut func, b0, b1);

        let cond_inst = func.dfg.make_inst(InstructionData::Trap);
        let cond = func.dfg.append_inst_result(cond_inst, Type::I1);
        func.layout.append_inst(cond_inst, b1);
        let loop_call = func.dfg.block_call(b2, &[]);
        let exit_call = func.dfg.block_call(b3, &[]);
        let brif = func.dfg.make_inst(InstructionData::Brif {
            arg: cond,
            blocks: [loop_call, exit_call],
        });
        func.layout.append_inst(brif, b1);

        jump(&mut func, b2, b1);
        let ret = func.dfg.make_inst(InstructionData::Return { args: Default::default() });
        func.layout.append_inst(ret, b3);

        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&func);
        let mut domtree = DominatorTree::new();
        domtree.compute(&func, &cfg);
        let mut forest = LoopForest::new();
        forest.compute(&func, &cfg, &domtree);

        assert!(forest.is_loop_header(b1));
        assert!(!forest.is_loop_header(b2));
        let lp = forest.get_loop(b1).unwrap();
        assert_eq!(forest.header(lp), b1);
        let mut body: Vec<_> = forest.body(lp).collect();
        body.sort_by_key(|b| b.to_string());
        let mut expected = vec![b1, b2];
        expected.sort_by_key(|b| b.to_string());
        assert_eq!(body, expected);
        assert_eq!(forest.depth(lp), 0);
        assert_eq!(forest.get_loop(b0), None);
        assert_eq!(forest.get_loop(b3), None);
    }
}

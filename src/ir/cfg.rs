//! The control-flow graph: predecessor/successor lists derived from each
//! block's terminator. Never edited directly — call [`ControlFlowGraph::compute`]
//! again after changing the layout.

use cranelift_entity::SecondaryMap;
use smallvec::SmallVec;

use super::entities::{Block, Inst};
use super::function::Function;

/// A block that branches to another, paired with the terminator instruction
/// that does the branching. An instruction with two calls to the same
/// target (`brif c, t, t`) contributes two identical `BlockPredecessor`
/// entries to `t`'s predecessor list — see [`ControlFlowGraph`]'s
/// no-deduplication contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPredecessor {
    pub block: Block,
    pub inst: Inst,
}

#[derive(Clone, Debug, Default)]
struct CfgNode {
    predecessors: SmallVec<[BlockPredecessor; 4]>,
    successors: SmallVec<[Block; 4]>,
}

/// Predecessor/successor lists for every block in a [`Function`], scanned
/// from each block's terminator instruction.
///
/// Edges are **not** deduplicated: a `brif c, t, t` yields two entries for
/// `t` in `successors(block)` and two entries for `block` in
/// `predecessors(t)`, preserving the multiplicity a later critical-edge
/// split needs to tell the two `BlockCall`s apart.
#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    data: SecondaryMap<Block, CfgNode>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Recompute from `func`'s current layout and DFG, discarding any
    /// previous edges.
    pub fn compute(&mut self, func: &Function) {
        self.clear();
        for block in func.layout.blocks() {
            let Some(last) = func.layout.last_inst(block) else {
                continue;
            };
            for call in func.dfg.branch_destinations(last) {
                let dest = call.block();
                self.data[block].successors.push(dest);
                self.data[dest]
                    .predecessors
                    .push(BlockPredecessor { block, inst: last });
            }
        }
    }

    pub fn successors(&self, block: Block) -> &[Block] {
        &self.data[block].successors
    }

    pub fn predecessors(&self, block: Block) -> &[BlockPredecessor] {
        &self.data[block].predecessors
    }

    pub fn pred_blocks(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        self.data[block].predecessors.iter().map(|p| p.block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::InstructionData;
    use crate::ir::sidetables::Signature;
    use crate::types::Type;

    /// `b0: jump b1`; `b1: return`.
    fn linear() -> (Function, Block, Block) {
        let mut func = Function::new("f", Signature::default());
        let b0 = func.dfg.make_block();
        let b1 = func.dfg.make_block();
        func.layout.append_block(b0);
        func.layout.append_block(b1);

        let call = func.dfg.block_call(b1, &[]);
        let jump = func.dfg.make_inst(InstructionData::Jump { dest: call });
        func.layout.append_inst(jump, b0);

        let ret = func.dfg.make_inst(InstructionData::Return { args: Default::default() });
        func.layout.append_inst(ret, b1);

        (func, b0, b1)
    }

    #[test]
    fn linear_cfg_has_one_edge() {
        let (func, b0, b1) = linear();
        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&func);
        assert_eq!(cfg.successors(b0), &[b1]);
        assert!(cfg.successors(b1).is_empty());
        assert_eq!(cfg.pred_blocks(b1).collect::<Vec<_>>(), vec![b0]);
    }

    #[test]
    fn diamond_cfg_joins_at_b3() {
        let mut func = Function::new("f", Signature::default());
        let b0 = func.dfg.make_block();
        let b1 = func.dfg.make_block();
        let b2 = func.dfg.make_block();
        let b3 = func.dfg.make_block();
        for b in [b0, b1, b2, b3] {
            func.layout.append_block(b);
        }

        let cond_inst = func.dfg.make_inst(InstructionData::Trap);
        let cond = func.dfg.append_inst_result(cond_inst, Type::I1);
        func.layout.append_inst(cond_inst, b0);

        let then_call = func.dfg.block_call(b1, &[]);
        let else_call = func.dfg.block_call(b2, &[]);
        let brif = func.dfg.make_inst(InstructionData::Brif {
            arg: cond,
            blocks: [then_call, else_call],
        });
        func.layout.append_inst(brif, b0);

        for (from, to) in [(b1, b3), (b2, b3)] {
            let call = func.dfg.block_call(to, &[]);
            let jump = func.dfg.make_inst(InstructionData::Jump { dest: call });
            func.layout.append_inst(jump, from);
        }

        let ret = func.dfg.make_inst(InstructionData::Return { args: Default::default() });
        func.layout.append_inst(ret, b3);

        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&func);
        assert_eq!(cfg.successors(b0), &[b1, b2]);
        assert_eq!(cfg.pred_blocks(b3).collect::<Vec<_>>(), vec![b1, b2]);
    }

    #[test]
    fn br_table_yields_edges_to_default_and_every_target() {
        let mut func = Function::new("f", Signature::default());
        let b0 = func.dfg.make_block();
        let b1 = func.dfg.make_block();
        let b2 = func.dfg.make_block();
        let default = func.dfg.make_block();
        for b in [b0, b1, b2, default] {
            func.layout.append_block(b);
        }

        let idx_inst = func.dfg.make_inst(InstructionData::Trap);
        let idx = func.dfg.append_inst_result(idx_inst, Type::I32);
        func.layout.append_inst(idx_inst, b0);

        let table = func.dfg.make_jump_table(vec![b1, b2]);
        let default_call = func.dfg.block_call(default, &[]);
        let br_table = func.dfg.make_inst(InstructionData::BrTable {
            arg: idx,
            default: default_call,
            table,
        });
        func.layout.append_inst(br_table, b0);

        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&func);
        assert_eq!(cfg.successors(b0), &[default, b1, b2]);
        assert_eq!(cfg.pred_blocks(b1).collect::<Vec<_>>(), vec![b0]);
        assert_eq!(cfg.pred_blocks(b2).collect::<Vec<_>>(), vec![b0]);
        assert_eq!(cfg.pred_blocks(default).collect::<Vec<_>>(), vec![b0]);
    }

    #[test]
    fn brif_to_same_target_is_not_deduplicated() {
        let mut func = Function::new("f", Signature::default());
        let b0 = func.dfg.make_block();
        let b1 = func.dfg.make_block();
        func.layout.append_block(b0);
        func.layout.append_block(b1);

        let cond_inst = func.dfg.make_inst(InstructionData::Trap);
        let cond = func.dfg.append_inst_result(cond_inst, Type::I1);
        func.layout.append_inst(cond_inst, b0);

        let t0 = func.dfg.block_call(b1, &[]);
        let t1 = func.dfg.block_call(b1, &[]);
        let brif = func.dfg.make_inst(InstructionData::Brif {
            arg: cond,
            blocks: [t0, t1],
        });
        func.layout.append_inst(brif, b0);

        let mut cfg = ControlFlowGraph::new();
        cfg.compute(&func);
        assert_eq!(cfg.successors(b0), &[b1, b1]);
        assert_eq!(cfg.predecessors(b1).len(), 2);
    }
}

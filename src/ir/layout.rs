//! The ordering of blocks and instructions within a function.
//!
//! The [`DataFlowGraph`](super::dfg::DataFlowGraph) knows what every
//! instruction and value *is*; the `Layout` knows *where* each instruction
//! sits — which block it belongs to and what comes before and after it. Both
//! orderings are intrusive doubly-linked lists threaded through
//! [`SecondaryMap`]s rather than `Vec`s, so inserting or removing an
//! instruction in the middle of a block is O(1) and never invalidates a
//! `Block`/`Inst` handle held elsewhere.

use cranelift_entity::packed_option::PackedOption;
use cranelift_entity::SecondaryMap;

use crate::error::IrError;

use super::entities::{Block, Inst};

#[derive(Clone, Debug, Default)]
struct BlockNode {
    prev: PackedOption<Block>,
    next: PackedOption<Block>,
    first_inst: PackedOption<Inst>,
    last_inst: PackedOption<Inst>,
}

#[derive(Clone, Debug, Default)]
struct InstNode {
    block: PackedOption<Block>,
    prev: PackedOption<Inst>,
    next: PackedOption<Inst>,
}

/// The linear order of blocks, and of instructions within each block.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    blocks: SecondaryMap<Block, BlockNode>,
    insts: SecondaryMap<Inst, InstNode>,
    first_block: PackedOption<Block>,
    last_block: PackedOption<Block>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.insts.clear();
        self.first_block = None.into();
        self.last_block = None.into();
    }

    // -- blocks -----------------------------------------------------------

    /// The function's entry block: the first block ever appended to the
    /// layout. `None` for an empty function.
    pub fn entry_block(&self) -> Option<Block> {
        self.first_block.expand()
    }

    pub fn is_block_inserted(&self, block: Block) -> bool {
        self.blocks[block].prev.is_some() || self.blocks[block].next.is_some() || self.first_block == block.into()
    }

    /// Append `block` to the end of the layout.
    pub fn append_block(&mut self, block: Block) {
        let prev = self.last_block.expand();
        self.blocks[block] = BlockNode {
            prev: prev.into(),
            next: None.into(),
            first_inst: None.into(),
            last_inst: None.into(),
        };
        match prev {
            Some(p) => self.blocks[p].next = block.into(),
            None => self.first_block = block.into(),
        }
        self.last_block = block.into();
    }

    pub fn insert_block_after(&mut self, block: Block, after: Block) {
        let next = self.blocks[after].next.expand();
        self.blocks[block] = BlockNode {
            prev: after.into(),
            next: next.into(),
            first_inst: None.into(),
            last_inst: None.into(),
        };
        self.blocks[after].next = block.into();
        match next {
            Some(n) => self.blocks[n].prev = block.into(),
            None => self.last_block = block.into(),
        }
    }

    pub fn insert_block_before(&mut self, block: Block, before: Block) {
        let prev = self.blocks[before].prev.expand();
        self.blocks[block] = BlockNode {
            prev: prev.into(),
            next: before.into(),
            first_inst: None.into(),
            last_inst: None.into(),
        };
        self.blocks[before].prev = block.into();
        match prev {
            Some(p) => self.blocks[p].next = block.into(),
            None => self.first_block = block.into(),
        }
    }

    /// Detach `block` (and every instruction still in it) from the layout.
    /// The block and its instructions remain valid handles into the DFG;
    /// they're simply no longer part of the function's order.
    pub fn remove_block(&mut self, block: Block) {
        let node = std::mem::take(&mut self.blocks[block]);
        match node.prev.expand() {
            Some(p) => self.blocks[p].next = node.next,
            None => self.first_block = node.next,
        }
        match node.next.expand() {
            Some(n) => self.blocks[n].prev = node.prev,
            None => self.last_block = node.prev,
        }
    }

    pub fn next_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].next.expand()
    }

    pub fn prev_block(&self, block: Block) -> Option<Block> {
        self.blocks[block].prev.expand()
    }

    /// Iterate over every block in layout order.
    pub fn blocks(&self) -> BlockIter<'_> {
        BlockIter {
            layout: self,
            next: self.first_block.expand(),
        }
    }

    // -- instructions -------------------------------------------------------

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block.expand()
    }

    pub fn is_inst_inserted(&self, inst: Inst) -> bool {
        self.insts[inst].block.is_some()
    }

    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].first_inst.expand()
    }

    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last_inst.expand()
    }

    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].next.expand()
    }

    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.insts[inst].prev.expand()
    }

    /// Append `inst` to the end of `block`.
    pub fn append_inst(&mut self, inst: Inst, block: Block) {
        let prev = self.blocks[block].last_inst.expand();
        self.insts[inst] = InstNode {
            block: block.into(),
            prev: prev.into(),
            next: None.into(),
        };
        match prev {
            Some(p) => self.insts[p].next = inst.into(),
            None => self.blocks[block].first_inst = inst.into(),
        }
        self.blocks[block].last_inst = inst.into();
    }

    /// Insert `inst` immediately after `after`, in `after`'s block.
    ///
    /// Fails with [`IrError::InstNotInserted`] if `after` isn't in the
    /// layout.
    pub fn insert_inst_after(&mut self, inst: Inst, after: Inst) -> Result<(), IrError> {
        let block = self.insts[after].block.expand().ok_or(IrError::InstNotInserted)?;
        let next = self.insts[after].next.expand();
        self.insts[inst] = InstNode {
            block: block.into(),
            prev: after.into(),
            next: next.into(),
        };
        self.insts[after].next = inst.into();
        match next {
            Some(n) => self.insts[n].prev = inst.into(),
            None => self.blocks[block].last_inst = inst.into(),
        }
        Ok(())
    }

    /// Insert `inst` immediately before `before`, in `before`'s block.
    ///
    /// Fails with [`IrError::InstNotInserted`] if `before` isn't in the
    /// layout.
    pub fn insert_inst_before(&mut self, inst: Inst, before: Inst) -> Result<(), IrError> {
        let block = self.insts[before].block.expand().ok_or(IrError::InstNotInserted)?;
        let prev = self.insts[before].prev.expand();
        self.insts[inst] = InstNode {
            block: block.into(),
            prev: prev.into(),
            next: before.into(),
        };
        self.insts[before].prev = inst.into();
        match prev {
            Some(p) => self.insts[p].next = inst.into(),
            None => self.blocks[block].first_inst = inst.into(),
        }
        Ok(())
    }

    /// Detach `inst` from its block. The instruction's data in the DFG is
    /// untouched; it simply stops being part of any block's order.
    pub fn remove_inst(&mut self, inst: Inst) {
        let node = std::mem::take(&mut self.insts[inst]);
        let block = match node.block.expand() {
            Some(b) => b,
            None => return,
        };
        match node.prev.expand() {
            Some(p) => self.insts[p].next = node.next,
            None => self.blocks[block].first_inst = node.next,
        }
        match node.next.expand() {
            Some(n) => self.insts[n].prev = node.prev,
            None => self.blocks[block].last_inst = node.prev,
        }
    }

    /// Iterate over every instruction in `block`, in layout order.
    pub fn block_insts(&self, block: Block) -> InstIter<'_> {
        InstIter {
            layout: self,
            next: self.blocks[block].first_inst.expand(),
        }
    }
}

pub struct BlockIter<'a> {
    layout: &'a Layout,
    next: Option<Block>,
}

impl<'a> Iterator for BlockIter<'a> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let block = self.next?;
        self.next = self.layout.next_block(block);
        Some(block)
    }
}

pub struct InstIter<'a> {
    layout: &'a Layout,
    next: Option<Inst>,
}

impl<'a> Iterator for InstIter<'a> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let inst = self.next?;
        self.next = self.layout.next_inst(inst);
        Some(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(n: u32) -> Vec<Block> {
        (0..n).map(Block::from_u32).collect()
    }

    fn insts(n: u32) -> Vec<Inst> {
        (0..n).map(Inst::from_u32).collect()
    }

    #[test]
    fn append_blocks_and_iterate_in_order() {
        let mut layout = Layout::new();
        let bs = blocks(3);
        for &b in &bs {
            layout.append_block(b);
        }
        assert_eq!(layout.entry_block(), Some(bs[0]));
        assert_eq!(layout.blocks().collect::<Vec<_>>(), bs);
    }

    #[test]
    fn insert_block_before_and_after() {
        let mut layout = Layout::new();
        let bs = blocks(3);
        layout.append_block(bs[0]);
        layout.append_block(bs[2]);
        layout.insert_block_before(bs[1], bs[2]);
        assert_eq!(layout.blocks().collect::<Vec<_>>(), bs);
    }

    #[test]
    fn remove_block_splices_neighbors() {
        let mut layout = Layout::new();
        let bs = blocks(3);
        for &b in &bs {
            layout.append_block(b);
        }
        layout.remove_block(bs[1]);
        assert_eq!(layout.blocks().collect::<Vec<_>>(), vec![bs[0], bs[2]]);
        assert_eq!(layout.next_block(bs[0]), Some(bs[2]));
    }

    #[test]
    fn append_and_iterate_instructions_within_a_block() {
        let mut layout = Layout::new();
        let b = Block::from_u32(0);
        layout.append_block(b);
        let is = insts(3);
        for &i in &is {
            layout.append_inst(i, b);
        }
        assert_eq!(layout.block_insts(b).collect::<Vec<_>>(), is);
        assert_eq!(layout.inst_block(is[1]), Some(b));
    }

    #[test]
    fn insert_inst_before_and_after_an_anchor() {
        let mut layout = Layout::new();
        let b = Block::from_u32(0);
        layout.append_block(b);
        let is = insts(3);
        layout.append_inst(is[0], b);
        layout.append_inst(is[2], b);
        layout.insert_inst_before(is[1], is[2]).unwrap();
        assert_eq!(layout.block_insts(b).collect::<Vec<_>>(), is);
    }

    #[test]
    fn insert_after_unrooted_anchor_fails() {
        let mut layout = Layout::new();
        let orphan = Inst::from_u32(0);
        let new = Inst::from_u32(1);
        assert_eq!(
            layout.insert_inst_after(new, orphan),
            Err(IrError::InstNotInserted)
        );
    }

    #[test]
    fn remove_inst_splices_neighbors_and_updates_block_bounds() {
        let mut layout = Layout::new();
        let b = Block::from_u32(0);
        layout.append_block(b);
        let is = insts(3);
        for &i in &is {
            layout.append_inst(i, b);
        }
        layout.remove_inst(is[2]);
        assert_eq!(layout.block_insts(b).collect::<Vec<_>>(), vec![is[0], is[1]]);
        assert_eq!(layout.last_inst(b), Some(is[1]));
        assert_eq!(layout.inst_block(is[2]), None);
    }
}

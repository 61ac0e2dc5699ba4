//! The data-flow graph: instructions, values, block parameters, and the
//! aliasing/typing contract tying them together.
//!
//! Position within the function (which block an instruction is in, which
//! order blocks and instructions come in) is *not* tracked here — that's
//! [`Layout`](super::layout::Layout)'s job. The DFG only knows what each
//! instruction and value *is*.

use std::ops::{Index, IndexMut};

use cranelift_entity::{PrimaryMap, SecondaryMap};
use log::trace;
use smallvec::SmallVec;

use crate::types::Type;

use super::entities::{Block, BlockArg, Immediate, Inst, JumpTable, Value, ValueList, ValueListPool};
use super::instructions::{BlockArgListPool, BlockCall, InstructionData, JumpTableData};

/// Where a [`Value`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    /// The value is the `n`'th result of an instruction.
    Result(Inst, usize),
    /// The value is the `n`'th parameter of a block.
    Param(Block, usize),
    /// The value merges two other values (reserved for a future union/
    /// congruence pass; no operation in this crate constructs one yet).
    Union(Value, Value),
}

impl ValueDef {
    pub fn inst(&self) -> Option<Inst> {
        match *self {
            Self::Result(inst, _) => Some(inst),
            _ => None,
        }
    }

    pub fn unwrap_inst(&self) -> Inst {
        self.inst().expect("value is not an instruction result")
    }

    pub fn block(&self) -> Option<Block> {
        match *self {
            Self::Param(block, _) => Some(block),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum ValueData {
    Inst { ty: Type, num: u16, inst: Inst },
    Param { ty: Type, num: u16, block: Block },
    Alias { ty: Type, original: Value },
    Union { ty: Type, x: Value, y: Value },
    /// The block parameter this value used to be was removed by
    /// [`DataFlowGraph::remove_block_param`] and has not (yet) been
    /// redirected to a real definition with [`DataFlowGraph::change_to_alias`].
    Removed,
}

#[derive(Clone, Debug, PartialEq, Default)]
struct BlockData {
    params: ValueList,
}

/// Instructions, values, and block parameters, with the operand pools they
/// share. Deliberately not `Serialize`/`Deserialize` even under
/// `enable-serde` — a meaningful round trip would need to also preserve the
/// `Layout`'s block/instruction order, which lives in a sibling structure.
#[derive(Clone, Debug, PartialEq)]
pub struct DataFlowGraph {
    insts: PrimaryMap<Inst, InstructionData>,
    results: SecondaryMap<Inst, ValueList>,
    blocks: PrimaryMap<Block, BlockData>,
    pub value_lists: ValueListPool,
    pub block_arg_lists: BlockArgListPool,
    values: PrimaryMap<Value, ValueData>,
    pub jump_tables: PrimaryMap<JumpTable, JumpTableData>,
    immediates: PrimaryMap<Immediate, i64>,
}

impl Default for DataFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self {
            insts: PrimaryMap::new(),
            results: SecondaryMap::new(),
            blocks: PrimaryMap::new(),
            value_lists: ValueListPool::new(),
            block_arg_lists: BlockArgListPool::new(),
            values: PrimaryMap::new(),
            jump_tables: PrimaryMap::new(),
            immediates: PrimaryMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.insts.clear();
        self.results.clear();
        self.blocks.clear();
        self.value_lists.clear();
        self.block_arg_lists.clear();
        self.values.clear();
        self.jump_tables.clear();
        self.immediates.clear();
    }

    /// Intern a raw 64-bit immediate payload, shared by `iconst` (plain
    /// integer bit pattern) and `fconst` (IEEE-754 bit pattern via
    /// `f64::to_bits`).
    pub fn make_imm(&mut self, bits: i64) -> Immediate {
        self.immediates.push(bits)
    }

    pub fn imm_value(&self, imm: Immediate) -> i64 {
        self.immediates[imm]
    }

    // -- instructions --------------------------------------------------

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    pub fn inst_is_valid(&self, inst: Inst) -> bool {
        self.insts.is_valid(inst)
    }

    /// Allocate an instruction holding `data`. This has no effect on the
    /// layout: the instruction exists in the DFG but is not yet part of any
    /// block's order.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let inst = self.insts.push(data);
        trace!("{inst} = {:?}", self.insts[inst].opcode());
        inst
    }

    pub fn inst_results(&self, inst: Inst) -> &[Value] {
        self.results[inst].as_slice(&self.value_lists)
    }

    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst]
            .first(&self.value_lists)
            .expect("instruction has no results")
    }

    pub fn has_results(&self, inst: Inst) -> bool {
        !self.results[inst].is_empty()
    }

    /// Add a typed result value to `inst`. Call order determines result
    /// position.
    pub fn append_inst_result(&mut self, inst: Inst, ty: Type) -> Value {
        let num = self.results[inst].len(&self.value_lists);
        assert!(num <= u16::MAX as usize, "too many results on one instruction");
        let value = self.values.push(ValueData::Inst {
            ty,
            num: num as u16,
            inst,
        });
        self.results[inst].push(value, &mut self.value_lists);
        value
    }

    pub fn block_call(&mut self, block: Block, args: &[BlockArg]) -> BlockCall {
        BlockCall::new(block, args, &mut self.block_arg_lists)
    }

    /// Append `arg` to every [`BlockCall`] on `inst` that targets `dest`.
    ///
    /// A branch can carry more than one call to the same block (`brif c, t,
    /// t`); both edges originate at the same live point, so extending one
    /// with a freshly-resolved SSA value extends the other identically,
    /// keeping each call's argument count in sync with `dest`'s parameter
    /// count.
    pub fn append_branch_arg(&mut self, inst: Inst, dest: Block, arg: Value) {
        let block_arg = BlockArg::value(arg);
        for call in self.insts[inst].block_calls_mut() {
            if call.block() == dest {
                call.append_argument(block_arg, &mut self.block_arg_lists);
            }
        }
    }

    /// Remove the argument at position `ix` from every [`BlockCall`] on
    /// `inst` that targets `dest`. The mirror image of
    /// [`append_branch_arg`](Self::append_branch_arg), used when trivial-phi
    /// elimination deletes a block parameter and every predecessor's call
    /// must drop the matching argument to stay positionally aligned.
    pub fn remove_branch_arg(&mut self, inst: Inst, dest: Block, ix: usize) {
        for call in self.insts[inst].block_calls_mut() {
            if call.block() == dest {
                call.remove(ix, &mut self.block_arg_lists);
            }
        }
    }

    /// Intern a `br_table`'s dense target list. `targets` must be non-empty;
    /// an index that misses every target still needs somewhere to land, and
    /// that's what `br_table`'s `default` edge is for, not an empty table.
    pub fn make_jump_table(&mut self, targets: Vec<Block>) -> JumpTable {
        assert!(!targets.is_empty(), "a jump table must have at least one target");
        self.jump_tables.push(JumpTableData { targets })
    }

    pub fn jump_table_targets(&self, table: JumpTable) -> &[Block] {
        &self.jump_tables[table].targets
    }

    /// Every branch destination of `inst`, `br_table` targets included.
    /// Unlike [`InstructionData::block_calls`], which only exposes the
    /// `BlockCall`s an instruction stores directly, this resolves a
    /// `br_table`'s `table` through the jump-table pool and returns
    /// `default` plus one synthesized no-argument `BlockCall` per target.
    /// [`ControlFlowGraph`](super::cfg::ControlFlowGraph) computation goes
    /// through this rather than `block_calls` so that jump-table edges are
    /// never silently dropped from the CFG, dominator tree, or loop forest.
    pub fn branch_destinations(&self, inst: Inst) -> SmallVec<[BlockCall; 4]> {
        match &self.insts[inst] {
            InstructionData::BrTable { default, table, .. } => {
                let mut calls: SmallVec<[BlockCall; 4]> = SmallVec::new();
                calls.push(default.clone());
                calls.extend(self.jump_tables[*table].targets.iter().map(|&b| BlockCall::no_args(b)));
                calls
            }
            other => SmallVec::from_slice(other.block_calls()),
        }
    }

    // -- blocks ----------------------------------------------------------

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_is_valid(&self, block: Block) -> bool {
        self.blocks.is_valid(block)
    }

    pub fn make_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    pub fn block_params(&self, block: Block) -> &[Value] {
        self.blocks[block].params.as_slice(&self.value_lists)
    }

    pub fn num_block_params(&self, block: Block) -> usize {
        self.blocks[block].params.len(&self.value_lists)
    }

    /// Append a typed parameter to `block`. Call order determines parameter
    /// position (and therefore which argument slot in each predecessor's
    /// [`BlockCall`] supplies it).
    pub fn append_block_param(&mut self, block: Block, ty: Type) -> Value {
        let num = self.blocks[block].params.len(&self.value_lists);
        assert!(num <= u16::MAX as usize, "too many parameters on one block");
        let value = self.values.push(ValueData::Param {
            ty,
            num: num as u16,
            block,
        });
        self.blocks[block].params.push(value, &mut self.value_lists);
        value
    }

    /// Remove `value` from its owning block's parameter list. `value`
    /// becomes a dangling, untyped definition (`value_type` returns `None`)
    /// until redirected with [`change_to_alias`](Self::change_to_alias) —
    /// the state trivial-phi elimination leaves a sentinel parameter in
    /// right before aliasing it to the value it turned out to be redundant
    /// with.
    pub fn remove_block_param(&mut self, value: Value) {
        let (block, num) = match self.values[value] {
            ValueData::Param { block, num, .. } => (block, num as usize),
            ref other => panic!("{value} is not a block parameter: {other:?}"),
        };
        self.blocks[block].params.remove(num, &mut self.value_lists);
        let remaining: smallvec::SmallVec<[Value; 8]> = self.blocks[block]
            .params
            .as_slice(&self.value_lists)[num..]
            .iter()
            .copied()
            .collect();
        for (i, v) in remaining.into_iter().enumerate() {
            if let ValueData::Param { num: n, .. } = &mut self.values[v] {
                *n = (num + i) as u16;
            }
        }
        self.values[value] = ValueData::Removed;
    }

    // -- values ------------------------------------------------------------

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn value_is_valid(&self, v: Value) -> bool {
        self.values.is_valid(v)
    }

    /// The type of `value`, resolving aliases first. `None` iff `value` is
    /// a removed block parameter that hasn't been aliased to anything.
    pub fn value_type(&self, value: Value) -> Option<Type> {
        let resolved = self.resolve_aliases(value);
        match self.values[resolved] {
            ValueData::Inst { ty, .. }
            | ValueData::Param { ty, .. }
            | ValueData::Alias { ty, .. }
            | ValueData::Union { ty, .. } => Some(ty),
            ValueData::Removed => None,
        }
    }

    pub fn value_def(&self, v: Value) -> ValueDef {
        match self.values[v] {
            ValueData::Inst { num, inst, .. } => ValueDef::Result(inst, num as usize),
            ValueData::Param { num, block, .. } => ValueDef::Param(block, num as usize),
            ValueData::Union { x, y, .. } => ValueDef::Union(x, y),
            ValueData::Alias { original, .. } => self.value_def(self.resolve_aliases(original)),
            ValueData::Removed => panic!("{v} has been removed; it has no definition"),
        }
    }

    /// Walk alias edges until reaching a non-alias `Value`. Terminates
    /// because `change_to_alias` refuses to create a cycle.
    pub fn resolve_aliases(&self, value: Value) -> Value {
        let mut v = value;
        for _ in 0..=self.values.len() {
            match self.values[v] {
                ValueData::Alias { original, .. } => v = original,
                _ => return v,
            }
        }
        panic!("value alias loop detected starting from {value}");
    }

    /// Make `from` behave as an alias of `to`: every future `value_type`/
    /// `resolve_aliases`/`value_def` call on `from` is redirected to `to`'s
    /// resolved target. Used by SSA trivial-phi elimination instead of
    /// rewriting every use of the eliminated phi.
    ///
    /// Panics if this would create an alias cycle, or if `from` already has
    /// a type that disagrees with `to`'s.
    pub fn change_to_alias(&mut self, from: Value, to: Value) {
        assert!(self.value_is_valid(from), "{from} is not a valid value");
        assert!(self.value_is_valid(to), "{to} is not a valid value");
        let original = self.resolve_aliases(to);
        assert_ne!(
            from, original,
            "aliasing {from} to {to} would create an alias cycle"
        );
        let ty = self
            .value_type(original)
            .expect("cannot alias to a value with no type");
        if let Some(from_ty) = self.value_type(from) {
            assert_eq!(
                from_ty, ty,
                "aliasing {from} to {to} would change its type from {from_ty} to {ty}"
            );
        }
        self.values[from] = ValueData::Alias { ty, original };
    }

    /// Iterate over every instruction ever allocated, in allocation order
    /// (not layout order).
    pub fn instructions(&self) -> impl Iterator<Item = Inst> + '_ {
        self.insts.keys()
    }

    /// Iterate over every value ever allocated, in allocation order,
    /// skipping removed-and-unaliased slots.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.values
            .keys()
            .filter(move |&v| !matches!(self.values[v], ValueData::Removed))
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys()
    }
}

impl Index<Inst> for DataFlowGraph {
    type Output = InstructionData;

    fn index(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }
}

impl IndexMut<Inst> for DataFlowGraph {
    fn index_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_inst_and_append_result() {
        let mut dfg = DataFlowGraph::new();
        let inst = dfg.make_inst(InstructionData::Trap);
        assert!(dfg.inst_is_valid(inst));
        assert!(dfg.inst_results(inst).is_empty());

        let v = dfg.append_inst_result(inst, Type::I32);
        assert_eq!(dfg.inst_results(inst), &[v]);
        assert_eq!(dfg.value_type(v), Some(Type::I32));
        assert_eq!(dfg.value_def(v), ValueDef::Result(inst, 0));
        assert_eq!(dfg.resolve_aliases(v), v);
    }

    #[test]
    fn block_params_are_ordered() {
        let mut dfg = DataFlowGraph::new();
        let b = dfg.make_block();
        let p0 = dfg.append_block_param(b, Type::I32);
        let p1 = dfg.append_block_param(b, Type::F64);
        assert_eq!(dfg.block_params(b), &[p0, p1]);
        assert_eq!(dfg.value_def(p0), ValueDef::Param(b, 0));
        assert_eq!(dfg.value_def(p1), ValueDef::Param(b, 1));
    }

    #[test]
    fn change_to_alias_resolves_and_preserves_type() {
        let mut dfg = DataFlowGraph::new();
        let inst = dfg.make_inst(InstructionData::Trap);
        let real = dfg.append_inst_result(inst, Type::I32);

        let b = dfg.make_block();
        let sentinel = dfg.append_block_param(b, Type::I32);
        dfg.remove_block_param(sentinel);
        assert_eq!(dfg.value_type(sentinel), None);

        dfg.change_to_alias(sentinel, real);
        assert_eq!(dfg.resolve_aliases(sentinel), real);
        assert_eq!(dfg.value_type(sentinel), Some(Type::I32));
    }

    #[test]
    #[should_panic(expected = "alias cycle")]
    fn change_to_alias_rejects_self_cycle() {
        let mut dfg = DataFlowGraph::new();
        let inst = dfg.make_inst(InstructionData::Trap);
        let v = dfg.append_inst_result(inst, Type::I32);
        dfg.change_to_alias(v, v);
    }

    #[test]
    fn append_branch_arg_extends_every_call_to_dest() {
        let mut dfg = DataFlowGraph::new();
        let then_blk = dfg.make_block();
        let else_blk = dfg.make_block();
        let cond_inst = dfg.make_inst(InstructionData::Trap);
        let cond = dfg.append_inst_result(cond_inst, Type::I1);

        let then_call = dfg.block_call(then_blk, &[]);
        let else_call = dfg.block_call(else_blk, &[]);
        let brif = dfg.make_inst(InstructionData::Brif {
            arg: cond,
            blocks: [then_call, else_call],
        });

        let extra = dfg.append_inst_result(cond_inst, Type::I32);
        dfg.append_branch_arg(brif, then_blk, extra);

        let InstructionData::Brif { blocks, .. } = &dfg[brif] else {
            unreachable!()
        };
        assert_eq!(blocks[0].args(&dfg.block_arg_lists).len(), 1);
        assert_eq!(blocks[1].args(&dfg.block_arg_lists).len(), 0);
    }
}

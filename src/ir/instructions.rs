//! Instruction opcodes and the tagged payloads that carry their operands.

use std::fmt;

use cranelift_entity::EntityList;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

use crate::atomic::AtomicRmwOp;
use crate::condcodes::{FloatCC, IntCC};

use super::entities::{Block, BlockArg, FuncRef, Immediate, JumpTable, Value, ValueList};

/// A `(target block, argument list)` pair attached to a branch instruction.
///
/// The block and its arguments are split into two fields rather than packed
/// into one shared list the way a plain [`ValueList`] of [`Value`]s could
/// be, because a `BlockArg` argument can refer to a `try_call`'s exception
/// value before that call has produced a `Value` to name it with — see
/// [`BlockArg`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct BlockCall {
    block: Block,
    args: EntityList<BlockArg>,
}

/// Backing storage for every [`BlockCall`]'s argument list in a function.
pub type BlockArgListPool = cranelift_entity::ListPool<BlockArg>;

impl BlockCall {
    /// Construct a block call targeting `block` with the given arguments.
    pub fn new(block: Block, args: &[BlockArg], pool: &mut BlockArgListPool) -> Self {
        let mut list = EntityList::new();
        list.extend(args.iter().copied(), pool);
        Self { block, args: list }
    }

    /// A call to `block` with no arguments, built without touching the
    /// argument-list pool. Used for `br_table` targets: a jump table's
    /// entries are plain [`Block`]s with no per-edge arguments of their own
    /// (see [`JumpTableData`]), so resolving one into a `BlockCall` never
    /// needs pool access.
    pub fn no_args(block: Block) -> Self {
        Self {
            block,
            args: EntityList::new(),
        }
    }

    pub fn block(&self) -> Block {
        self.block
    }

    pub fn set_block(&mut self, block: Block) {
        self.block = block;
    }

    /// Append an argument to this block call's argument list.
    pub fn append_argument(&mut self, arg: BlockArg, pool: &mut BlockArgListPool) {
        self.args.push(arg, pool);
    }

    pub fn args<'a>(&self, pool: &'a BlockArgListPool) -> &'a [BlockArg] {
        self.args.as_slice(pool)
    }

    pub fn args_mut<'a>(&'a mut self, pool: &'a mut BlockArgListPool) -> &'a mut [BlockArg] {
        self.args.as_mut_slice(pool)
    }

    pub fn len(&self, pool: &BlockArgListPool) -> usize {
        self.args.len(pool)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn remove(&mut self, ix: usize, pool: &mut BlockArgListPool) {
        self.args.remove(ix, pool);
    }

    pub fn clear(&mut self, pool: &mut BlockArgListPool) {
        self.args.clear(pool);
    }

    /// Deep-clone this block call's argument list into the same pool. The
    /// returned `BlockCall` shares no storage with `self`.
    pub fn deep_clone(&self, pool: &mut BlockArgListPool) -> Self {
        Self {
            block: self.block,
            args: self.args.deep_clone(pool),
        }
    }

    pub fn display<'a>(&self, pool: &'a BlockArgListPool) -> DisplayBlockCall<'a> {
        DisplayBlockCall {
            call: self.clone(),
            pool,
        }
    }
}

pub struct DisplayBlockCall<'a> {
    call: BlockCall,
    pool: &'a BlockArgListPool,
}

impl<'a> fmt::Display for DisplayBlockCall<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.call.block())?;
        let args = self.call.args(self.pool);
        if !args.is_empty() {
            write!(f, "(")?;
            for (ix, arg) in args.iter().enumerate() {
                if ix > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg:?}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// The operation performed by a binary/unary arithmetic, bitwise, shift,
/// or conversion instruction; an opcode is a thinner concept here than a
/// full target ISA's instruction set since legalization and emission are
/// out of scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum Opcode {
    Iconst,
    Fconst,
    Iadd,
    Isub,
    Imul,
    Sdiv,
    Udiv,
    Srem,
    Urem,
    Band,
    Bor,
    Bxor,
    Ishl,
    Ushr,
    Sshr,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Icmp,
    Fcmp,
    Select,
    Load,
    Store,
    AtomicRmw,
    AtomicCas,
    Call,
    CallIndirect,
    Jump,
    Brif,
    BrTable,
    Return,
    Trap,
    Undef,
}

impl Opcode {
    pub const fn is_call(self) -> bool {
        matches!(self, Opcode::Call | Opcode::CallIndirect)
    }

    pub const fn is_branch(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::Brif | Opcode::BrTable)
    }

    pub const fn is_terminator(self) -> bool {
        self.is_branch() || matches!(self, Opcode::Return | Opcode::Trap)
    }

    pub const fn is_return(self) -> bool {
        matches!(self, Opcode::Return)
    }

    pub const fn can_trap(self) -> bool {
        matches!(
            self,
            Opcode::Trap
                | Opcode::Sdiv
                | Opcode::Udiv
                | Opcode::Srem
                | Opcode::Urem
                | Opcode::Load
                | Opcode::Store
                | Opcode::AtomicRmw
                | Opcode::AtomicCas
        )
    }

    pub const fn can_store(self) -> bool {
        matches!(self, Opcode::Store | Opcode::AtomicRmw | Opcode::AtomicCas)
    }

    pub const fn can_load(self) -> bool {
        matches!(self, Opcode::Load | Opcode::AtomicRmw | Opcode::AtomicCas)
    }

    /// True if this instruction has effects beyond producing its result
    /// values and reading/writing memory (calls can do anything; traps halt
    /// execution).
    pub const fn other_side_effects(self) -> bool {
        matches!(self, Opcode::Call | Opcode::CallIndirect | Opcode::Trap)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The direct or indirect callee plus argument list shared by call-shaped
/// instructions.
#[derive(Clone, Debug, PartialEq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct CallData {
    pub func_ref: FuncRef,
    pub args: ValueList,
}

/// Contents of a jump table: a dense list of targets for `br_table`. Targets
/// carry no block arguments — callers that need to pass values across a
/// `br_table` edge route them through a shared block parameter populated
/// before the branch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct JumpTableData {
    pub targets: Vec<Block>,
}

/// The tagged payload of an instruction. The shape varies with the opcode:
/// nullary, unary, binary, comparison, memory, atomic, call, and the
/// control-flow shapes (`jump`/`brif`/`br_table`/`return`/`trap`).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum InstructionData {
    Nullary {
        opcode: Opcode,
    },
    UnaryImm {
        opcode: Opcode,
        imm: Immediate,
    },
    Unary {
        opcode: Opcode,
        arg: Value,
    },
    Binary {
        opcode: Opcode,
        args: [Value; 2],
    },
    IntCompare {
        cond: IntCC,
        args: [Value; 2],
    },
    FloatCompare {
        cond: FloatCC,
        args: [Value; 2],
    },
    Select {
        cond: Value,
        args: [Value; 2],
    },
    Load {
        arg: Value,
    },
    Store {
        args: [Value; 2],
    },
    AtomicRmw {
        op: AtomicRmwOp,
        args: [Value; 2],
    },
    AtomicCas {
        args: [Value; 3],
    },
    Call {
        data: CallData,
    },
    CallIndirect {
        callee: Value,
        data: CallData,
    },
    Jump {
        dest: BlockCall,
    },
    Brif {
        arg: Value,
        blocks: [BlockCall; 2],
    },
    BrTable {
        arg: Value,
        default: BlockCall,
        table: JumpTable,
    },
    Return {
        args: ValueList,
    },
    Trap,
}

impl InstructionData {
    /// The opcode this instruction payload was built for.
    pub fn opcode(&self) -> Opcode {
        match self {
            InstructionData::Nullary { opcode } => *opcode,
            InstructionData::UnaryImm { opcode, .. } => *opcode,
            InstructionData::Unary { opcode, .. } => *opcode,
            InstructionData::Binary { opcode, .. } => *opcode,
            InstructionData::IntCompare { .. } => Opcode::Icmp,
            InstructionData::FloatCompare { .. } => Opcode::Fcmp,
            InstructionData::Select { .. } => Opcode::Select,
            InstructionData::Load { .. } => Opcode::Load,
            InstructionData::Store { .. } => Opcode::Store,
            InstructionData::AtomicRmw { .. } => Opcode::AtomicRmw,
            InstructionData::AtomicCas { .. } => Opcode::AtomicCas,
            InstructionData::Call { .. } => Opcode::Call,
            InstructionData::CallIndirect { .. } => Opcode::CallIndirect,
            InstructionData::Jump { .. } => Opcode::Jump,
            InstructionData::Brif { .. } => Opcode::Brif,
            InstructionData::BrTable { .. } => Opcode::BrTable,
            InstructionData::Return { .. } => Opcode::Return,
            InstructionData::Trap => Opcode::Trap,
        }
    }

    /// Fixed (non-list) value arguments of this instruction, in order. Does
    /// not include values buried in a [`ValueList`] (call/return arguments)
    /// or in a [`BlockCall`] (branch arguments) — callers that need those
    /// go through the [`DataFlowGraph`](super::dfg::DataFlowGraph) helpers,
    /// which have the pool needed to read them.
    pub fn fixed_args(&self) -> &[Value] {
        match self {
            InstructionData::Nullary { .. } | InstructionData::UnaryImm { .. } | InstructionData::Trap => &[],
            InstructionData::Unary { arg, .. } | InstructionData::Load { arg } => {
                std::slice::from_ref(arg)
            }
            InstructionData::Binary { args, .. }
            | InstructionData::IntCompare { args, .. }
            | InstructionData::FloatCompare { args, .. }
            | InstructionData::Store { args }
            | InstructionData::AtomicRmw { args, .. } => args,
            InstructionData::Select { args, .. } => args,
            InstructionData::AtomicCas { args } => args,
            InstructionData::Brif { arg, .. } | InstructionData::BrTable { arg, .. } => {
                std::slice::from_ref(arg)
            }
            InstructionData::CallIndirect { callee, .. } => std::slice::from_ref(callee),
            InstructionData::Call { .. } | InstructionData::Jump { .. } | InstructionData::Return { .. } => {
                &[]
            }
        }
    }

    pub fn fixed_args_mut(&mut self) -> &mut [Value] {
        match self {
            InstructionData::Nullary { .. } | InstructionData::UnaryImm { .. } | InstructionData::Trap => {
                &mut []
            }
            InstructionData::Unary { arg, .. } | InstructionData::Load { arg } => {
                std::slice::from_mut(arg)
            }
            InstructionData::Binary { args, .. }
            | InstructionData::IntCompare { args, .. }
            | InstructionData::FloatCompare { args, .. }
            | InstructionData::Store { args }
            | InstructionData::AtomicRmw { args, .. } => args,
            InstructionData::Select { args, .. } => args,
            InstructionData::AtomicCas { args } => args,
            InstructionData::Brif { arg, .. } | InstructionData::BrTable { arg, .. } => {
                std::slice::from_mut(arg)
            }
            InstructionData::CallIndirect { callee, .. } => std::slice::from_mut(callee),
            InstructionData::Call { .. } | InstructionData::Jump { .. } | InstructionData::Return { .. } => {
                &mut []
            }
        }
    }

    /// The [`BlockCall`]s stored directly on this instruction, if it is a
    /// branch. For `br_table` this is only the `default` edge — the jump
    /// table's targets aren't stored as `BlockCall`s (they carry no
    /// arguments of their own, see [`JumpTableData`]) and resolving them
    /// needs the [`DataFlowGraph`](super::dfg::DataFlowGraph)'s jump-table
    /// pool. Callers that need every branch edge, `br_table` targets
    /// included, must go through
    /// [`DataFlowGraph::branch_destinations`](super::dfg::DataFlowGraph::branch_destinations)
    /// instead.
    pub fn block_calls(&self) -> &[BlockCall] {
        match self {
            InstructionData::Jump { dest } => std::slice::from_ref(dest),
            InstructionData::Brif { blocks, .. } => blocks,
            InstructionData::BrTable { default, .. } => std::slice::from_ref(default),
            _ => &[],
        }
    }

    pub fn block_calls_mut(&mut self) -> &mut [BlockCall] {
        match self {
            InstructionData::Jump { dest } => std::slice::from_mut(dest),
            InstructionData::Brif { blocks, .. } => blocks,
            InstructionData::BrTable { default, .. } => std::slice::from_mut(default),
            _ => &mut [],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_predicates_cover_control_flow_shapes() {
        assert!(Opcode::Jump.is_branch());
        assert!(Opcode::Brif.is_branch());
        assert!(Opcode::BrTable.is_branch());
        assert!(Opcode::Jump.is_terminator());
        assert!(Opcode::Return.is_terminator());
        assert!(Opcode::Trap.is_terminator());
        assert!(!Opcode::Iadd.is_terminator());
        assert!(Opcode::Return.is_return());
        assert!(!Opcode::Call.is_return());
    }

    #[test]
    fn opcode_predicates_cover_memory_and_calls() {
        assert!(Opcode::Load.can_load());
        assert!(Opcode::Store.can_store());
        assert!(Opcode::AtomicRmw.can_load());
        assert!(Opcode::AtomicRmw.can_store());
        assert!(Opcode::Call.is_call());
        assert!(Opcode::CallIndirect.is_call());
        assert!(Opcode::Call.other_side_effects());
        assert!(!Opcode::Iadd.other_side_effects());
        assert!(Opcode::Sdiv.can_trap());
        assert!(!Opcode::Iadd.can_trap());
    }

    #[test]
    fn block_call_round_trips_args_through_pool() {
        let mut pool = BlockArgListPool::new();
        let b = Block::from_u32(0);
        let v0 = BlockArg::value(Value::from_u32(0));
        let v1 = BlockArg::value(Value::from_u32(1));
        let mut call = BlockCall::new(b, &[v0], &mut pool);
        assert_eq!(call.args(&pool), &[v0]);
        call.append_argument(v1, &mut pool);
        assert_eq!(call.args(&pool), &[v0, v1]);

        let clone = call.deep_clone(&mut pool);
        call.clear(&mut pool);
        assert!(call.args(&pool).is_empty());
        assert_eq!(clone.args(&pool), &[v0, v1]);
    }
}

//! Opaque entity handles into a [`Function`](super::function::Function)'s arenas.
//!
//! Every cross-reference in the IR — an instruction's result, a block's
//! predecessor, a call's callee — is one of these 32-bit handles rather than
//! a Rust reference. That sidesteps the aliasing rules a cyclic
//! block/instruction/value graph would otherwise require unsafe code to
//! satisfy, and keeps deletion cheap: dropping an entity from the layout
//! never has to chase down every place that referenced it.

use cranelift_entity::entity_impl;
use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// An opaque reference to a basic block in a [`Function`](super::function::Function).
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Block(u32);
entity_impl!(Block, "block");

/// An opaque reference to an SSA value: either an instruction result or a
/// block parameter.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Value(u32);
entity_impl!(Value, "v");

/// An opaque reference to an instruction in a [`Function`](super::function::Function).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An opaque reference to a stack slot. Frame layout is owned by a
/// downstream collaborator; this crate only hands out and stores the handle.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct StackSlot(u32);
entity_impl!(StackSlot, "ss");

/// An opaque reference to a global value (a value computed once and live for
/// the whole function, such as a scaling factor for a dynamically-sized
/// vector type).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct GlobalValue(u32);
entity_impl!(GlobalValue, "gv");

/// An opaque reference to a jump table, used by `br_table`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct JumpTable(u32);
entity_impl!(JumpTable, "jt");

/// An opaque reference to an immediate value too large to store inline in an
/// [`InstructionData`](super::instructions::InstructionData) payload.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Immediate(u32);
entity_impl!(Immediate, "imm");

/// An opaque reference to a function signature, used for indirect calls and
/// imported functions (see [`FuncData`](crate::ir::sidetables::FuncData)).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct SigRef(u32);
entity_impl!(SigRef, "sig");

/// An opaque reference to another function, callable directly.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "fn");

/// An opaque reference to a dynamic vector type (a base vector type scaled
/// at runtime by a [`GlobalValue`]).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct DynamicType(u32);
entity_impl!(DynamicType, "dt");

/// Variable-length sequences of [`Value`]s live in a shared pool and are
/// referenced by this small handle: block-parameter lists and instruction
/// argument lists that don't fit inline in [`InstructionData`](super::instructions::InstructionData).
pub type ValueList = cranelift_entity::EntityList<Value>;

/// Backing storage for every [`ValueList`] in a function.
pub type ValueListPool = cranelift_entity::ListPool<Value>;

const BLOCK_ARG_TAG_BITS: u32 = 2;
const BLOCK_ARG_PAYLOAD_BITS: u32 = 32 - BLOCK_ARG_TAG_BITS;
const BLOCK_ARG_PAYLOAD_MASK: u32 = (1 << BLOCK_ARG_PAYLOAD_BITS) - 1;

const BLOCK_ARG_TAG_VALUE: u32 = 0;
const BLOCK_ARG_TAG_TRY_CALL_RET: u32 = 1;
const BLOCK_ARG_TAG_TRY_CALL_EXN: u32 = 2;

/// A single argument passed across a [`BlockCall`](super::instructions::BlockCall).
///
/// Most block-call arguments are just a [`Value`] computed before the
/// branch. Exception-handling instructions (a `try_call`-style construct)
/// additionally need to pass the *n*'th return value or the caught
/// exception value of the call itself to the taken block, before either one
/// has its own `Value` — `BlockArg` is the sum type that lets a block-call
/// argument list carry both kinds uniformly. It packs into one `u32`: the
/// top two bits are the tag, the low 30 bits are either a `Value` index or
/// the integer `i`. `payload` must fit in 30 bits; encoding checks this.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct BlockArg(u32);
entity_impl!(BlockArg);

/// The decoded form of a [`BlockArg`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BlockArgKind {
    /// A plain value computed before the branch.
    Value(Value),
    /// The `i`'th return value of the `try_call` this block call belongs to.
    TryCallRet(u32),
    /// The exception value of the `try_call` this block call belongs to.
    TryCallExn(u32),
}

impl BlockArg {
    /// Encode a plain value as a block-call argument.
    pub fn value(v: Value) -> Self {
        Self::encode(BLOCK_ARG_TAG_VALUE, v.as_u32())
    }

    /// Encode "the `i`'th return value of this `try_call`".
    pub fn try_call_ret(i: u32) -> Self {
        Self::encode(BLOCK_ARG_TAG_TRY_CALL_RET, i)
    }

    /// Encode "the exception value of this `try_call`".
    pub fn try_call_exn(i: u32) -> Self {
        Self::encode(BLOCK_ARG_TAG_TRY_CALL_EXN, i)
    }

    fn encode(tag: u32, payload: u32) -> Self {
        assert!(
            payload <= BLOCK_ARG_PAYLOAD_MASK,
            "BlockArg payload {payload} overflows {BLOCK_ARG_PAYLOAD_BITS} bits"
        );
        Self((tag << BLOCK_ARG_PAYLOAD_BITS) | payload)
    }

    /// Decode this argument into its tag and payload.
    pub fn unpack(self) -> BlockArgKind {
        let tag = self.0 >> BLOCK_ARG_PAYLOAD_BITS;
        let payload = self.0 & BLOCK_ARG_PAYLOAD_MASK;
        match tag {
            BLOCK_ARG_TAG_VALUE => BlockArgKind::Value(Value::from_u32(payload)),
            BLOCK_ARG_TAG_TRY_CALL_RET => BlockArgKind::TryCallRet(payload),
            BLOCK_ARG_TAG_TRY_CALL_EXN => BlockArgKind::TryCallExn(payload),
            _ => unreachable!("BlockArg tag is only ever 2 bits wide"),
        }
    }

    /// The plain [`Value`] this argument carries, if it isn't a `try_call`
    /// return/exception placeholder.
    pub fn as_value(self) -> Option<Value> {
        match self.unpack() {
            BlockArgKind::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Debug for BlockArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unpack() {
            BlockArgKind::Value(v) => write!(f, "{v}"),
            BlockArgKind::TryCallRet(i) => write!(f, "ret{i}"),
            BlockArgKind::TryCallExn(i) => write!(f, "exn{i}"),
        }
    }
}

/// An opaque reference to any entity defined in this module, used to report
/// which handle an [`IrError::InvalidHandle`](crate::error::IrError::InvalidHandle) named.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum AnyEntity {
    Block(Block),
    Inst(Inst),
    Value(Value),
    StackSlot(StackSlot),
    GlobalValue(GlobalValue),
    JumpTable(JumpTable),
    FuncRef(FuncRef),
    SigRef(SigRef),
    DynamicType(DynamicType),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Block(r) => r.fmt(f),
            Self::Inst(r) => r.fmt(f),
            Self::Value(r) => r.fmt(f),
            Self::StackSlot(r) => r.fmt(f),
            Self::GlobalValue(r) => r.fmt(f),
            Self::JumpTable(r) => r.fmt(f),
            Self::FuncRef(r) => r.fmt(f),
            Self::SigRef(r) => r.fmt(f),
            Self::DynamicType(r) => r.fmt(f),
        }
    }
}

macro_rules! any_entity_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for AnyEntity {
            fn from(r: $ty) -> Self {
                Self::$variant(r)
            }
        }
    };
}

any_entity_from!(Block, Block);
any_entity_from!(Inst, Inst);
any_entity_from!(Value, Value);
any_entity_from!(StackSlot, StackSlot);
any_entity_from!(GlobalValue, GlobalValue);
any_entity_from!(JumpTable, JumpTable);
any_entity_from!(FuncRef, FuncRef);
any_entity_from!(SigRef, SigRef);
any_entity_from!(DynamicType, DynamicType);

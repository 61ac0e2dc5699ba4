//! A typed SSA intermediate representation core: entity arenas, a data-flow
//! graph, an intrusive-list layout, control-flow and dominance analysis,
//! on-demand SSA construction, and natural-loop discovery.
//!
//! Front ends build a [`Function`](ir::function::Function) with
//! [`FunctionBuilder`](ir::builder::FunctionBuilder) and
//! [`SsaBuilder`](ir::ssa::SsaBuilder), then hand it to
//! [`ControlFlowGraph`](ir::cfg::ControlFlowGraph),
//! [`DominatorTree`](ir::dominator_tree::DominatorTree), and
//! [`LoopForest`](ir::loops::LoopForest) for the analyses downstream passes
//! need. Nothing in this crate lowers to machine code or performs
//! optimization; it is the shared substrate those later stages sit on.

pub mod atomic;
pub mod condcodes;
pub mod error;
pub mod ir;
pub mod types;

#[cfg(feature = "enable-serde")]
pub use serde::{Deserialize, Serialize};

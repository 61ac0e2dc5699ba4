//! Error kinds raised by fallible operations on the public API.
//!
//! Invariant violations (an alias cycle, a [`BlockArg`](crate::ir::entities::BlockArg)
//! payload overflow, a malformed function handed to an analysis) are
//! `panic!`/`assert!` as specified, not `IrError` — they indicate a bug in
//! the caller or in this crate, not a recoverable condition.

use crate::ir::entities::AnyEntity;
use thiserror::Error;

/// Errors that a builder or layout operation can report to its caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    /// A builder operation that inserts instructions was invoked before
    /// [`FunctionBuilder::switch_to_block`](crate::ir::builder::FunctionBuilder::switch_to_block).
    #[error("no current block: call switch_to_block before building instructions")]
    NoCurrentBlock,

    /// [`Layout::insert_inst_before`](crate::ir::layout::Layout::insert_inst_before) or
    /// `insert_inst_after` was given an anchor instruction that has not been
    /// inserted into any block yet.
    #[error("instruction is not inserted into any block")]
    InstNotInserted,

    /// An operation was given a handle that does not belong to the `Function`
    /// it was invoked on (or that was never allocated at all). Detection is
    /// best-effort: an arena only knows whether an index is in bounds, not
    /// which `Function` originally produced it.
    #[error("invalid handle: {0}")]
    InvalidHandle(AnyEntity),

    /// Arena growth failed. No code path in this crate can construct this
    /// variant today (the underlying `cranelift-entity` arenas abort the
    /// process on allocation failure, like `Vec` does), but it is part of
    /// the public error type so callers can match on it exhaustively as
    /// this crate evolves allocator-failure reporting.
    #[error("out of memory growing an IR arena")]
    OutOfMemory,
}

//! Atomic read-modify-write operation kinds.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// The operation performed by an atomic read-modify-write instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum AtomicRmwOp {
    Add,
    Sub,
    And,
    Nand,
    Or,
    Xor,
    Xchg,
    Umin,
    Umax,
    Smin,
    Smax,
}

impl AtomicRmwOp {
    /// All eleven operations, in a fixed order.
    pub const ALL: [AtomicRmwOp; 11] = [
        AtomicRmwOp::Add,
        AtomicRmwOp::Sub,
        AtomicRmwOp::And,
        AtomicRmwOp::Nand,
        AtomicRmwOp::Or,
        AtomicRmwOp::Xor,
        AtomicRmwOp::Xchg,
        AtomicRmwOp::Umin,
        AtomicRmwOp::Umax,
        AtomicRmwOp::Smin,
        AtomicRmwOp::Smax,
    ];
}

impl fmt::Display for AtomicRmwOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AtomicRmwOp::*;
        let s = match self {
            Add => "add",
            Sub => "sub",
            And => "and",
            Nand => "nand",
            Or => "or",
            Xor => "xor",
            Xchg => "xchg",
            Umin => "umin",
            Umax => "umax",
            Smin => "smin",
            Smax => "smax",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing an [`AtomicRmwOp`] from text fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseAtomicRmwOpError(String);

impl fmt::Display for ParseAtomicRmwOpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown atomic rmw op: {}", self.0)
    }
}

impl std::error::Error for ParseAtomicRmwOpError {}

impl FromStr for AtomicRmwOp {
    type Err = ParseAtomicRmwOpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use AtomicRmwOp::*;
        Ok(match s {
            "add" => Add,
            "sub" => Sub,
            "and" => And,
            "nand" => Nand,
            "or" => Or,
            "xor" => Xor,
            "xchg" => Xchg,
            "umin" => Umin,
            "umax" => Umax,
            "smin" => Smin,
            "smax" => Smax,
            _ => return Err(ParseAtomicRmwOpError(s.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parse_round_trip() {
        for op in AtomicRmwOp::ALL {
            let text = op.to_string();
            assert_eq!(text.parse::<AtomicRmwOp>().unwrap(), op);
        }
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!("frobnicate".parse::<AtomicRmwOp>().is_err());
    }
}

//! Condition codes for comparisons.
//!
//! These mirror the algebraic structure Cranelift-style backends rely on:
//! `complement` and `swap_args` are involutions that commute, and
//! `without_equal`/`unsigned` are idempotent on `IntCC`.

use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// Condition code for integer comparisons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum IntCC {
    Equal,
    NotEqual,
    SignedLessThan,
    SignedGreaterThanOrEqual,
    SignedGreaterThan,
    SignedLessThanOrEqual,
    UnsignedLessThan,
    UnsignedGreaterThanOrEqual,
    UnsignedGreaterThan,
    UnsignedLessThanOrEqual,
}

impl IntCC {
    /// The logical complement: `complement(cc)` holds exactly when `cc` does not.
    pub const fn complement(self) -> Self {
        use IntCC::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            SignedLessThan => SignedGreaterThanOrEqual,
            SignedGreaterThanOrEqual => SignedLessThan,
            SignedGreaterThan => SignedLessThanOrEqual,
            SignedLessThanOrEqual => SignedGreaterThan,
            UnsignedLessThan => UnsignedGreaterThanOrEqual,
            UnsignedGreaterThanOrEqual => UnsignedLessThan,
            UnsignedGreaterThan => UnsignedLessThanOrEqual,
            UnsignedLessThanOrEqual => UnsignedGreaterThan,
        }
    }

    /// The condition code you get from swapping the two operands.
    pub const fn swap_args(self) -> Self {
        use IntCC::*;
        match self {
            Equal => Equal,
            NotEqual => NotEqual,
            SignedLessThan => SignedGreaterThan,
            SignedGreaterThan => SignedLessThan,
            SignedLessThanOrEqual => SignedGreaterThanOrEqual,
            SignedGreaterThanOrEqual => SignedLessThanOrEqual,
            UnsignedLessThan => UnsignedGreaterThan,
            UnsignedGreaterThan => UnsignedLessThan,
            UnsignedLessThanOrEqual => UnsignedGreaterThanOrEqual,
            UnsignedGreaterThanOrEqual => UnsignedLessThanOrEqual,
        }
    }

    /// Remove (or add) the "or-equal" part of this condition code, keeping signedness.
    pub const fn without_equal(self) -> Self {
        use IntCC::*;
        match self {
            SignedGreaterThanOrEqual => SignedGreaterThan,
            SignedLessThanOrEqual => SignedLessThan,
            UnsignedGreaterThanOrEqual => UnsignedGreaterThan,
            UnsignedLessThanOrEqual => UnsignedLessThan,
            other => other,
        }
    }

    /// Convert a signed condition code to its unsigned counterpart; a no-op on
    /// already-unsigned or signedness-agnostic codes.
    pub const fn unsigned(self) -> Self {
        use IntCC::*;
        match self {
            SignedLessThan => UnsignedLessThan,
            SignedGreaterThanOrEqual => UnsignedGreaterThanOrEqual,
            SignedGreaterThan => UnsignedGreaterThan,
            SignedLessThanOrEqual => UnsignedLessThanOrEqual,
            other => other,
        }
    }
}

impl fmt::Display for IntCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use IntCC::*;
        let s = match self {
            Equal => "eq",
            NotEqual => "ne",
            SignedLessThan => "slt",
            SignedGreaterThanOrEqual => "sge",
            SignedGreaterThan => "sgt",
            SignedLessThanOrEqual => "sle",
            UnsignedLessThan => "ult",
            UnsignedGreaterThanOrEqual => "uge",
            UnsignedGreaterThan => "ugt",
            UnsignedLessThanOrEqual => "ule",
        };
        f.write_str(s)
    }
}

/// Condition code for floating-point comparisons.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum FloatCC {
    Ordered,
    Unordered,
    Equal,
    NotEqual,
    OrderedNotEqual,
    UnorderedOrEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    UnorderedOrLessThan,
    UnorderedOrLessThanOrEqual,
    UnorderedOrGreaterThan,
    UnorderedOrGreaterThanOrEqual,
}

impl FloatCC {
    pub const fn complement(self) -> Self {
        use FloatCC::*;
        match self {
            Ordered => Unordered,
            Unordered => Ordered,
            Equal => NotEqual,
            NotEqual => Equal,
            OrderedNotEqual => UnorderedOrEqual,
            UnorderedOrEqual => OrderedNotEqual,
            LessThan => UnorderedOrGreaterThanOrEqual,
            UnorderedOrGreaterThanOrEqual => LessThan,
            LessThanOrEqual => UnorderedOrGreaterThan,
            UnorderedOrGreaterThan => LessThanOrEqual,
            GreaterThan => UnorderedOrLessThanOrEqual,
            UnorderedOrLessThanOrEqual => GreaterThan,
            GreaterThanOrEqual => UnorderedOrLessThan,
            UnorderedOrLessThan => GreaterThanOrEqual,
        }
    }

    pub const fn swap_args(self) -> Self {
        use FloatCC::*;
        match self {
            Ordered => Ordered,
            Unordered => Unordered,
            Equal => Equal,
            NotEqual => NotEqual,
            OrderedNotEqual => OrderedNotEqual,
            UnorderedOrEqual => UnorderedOrEqual,
            LessThan => GreaterThan,
            GreaterThan => LessThan,
            LessThanOrEqual => GreaterThanOrEqual,
            GreaterThanOrEqual => LessThanOrEqual,
            UnorderedOrLessThan => UnorderedOrGreaterThan,
            UnorderedOrGreaterThan => UnorderedOrLessThan,
            UnorderedOrLessThanOrEqual => UnorderedOrGreaterThanOrEqual,
            UnorderedOrGreaterThanOrEqual => UnorderedOrLessThanOrEqual,
        }
    }
}

impl fmt::Display for FloatCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use FloatCC::*;
        let s = match self {
            Ordered => "ord",
            Unordered => "uno",
            Equal => "eq",
            NotEqual => "ne",
            OrderedNotEqual => "one",
            UnorderedOrEqual => "ueq",
            LessThan => "lt",
            LessThanOrEqual => "le",
            GreaterThan => "gt",
            GreaterThanOrEqual => "ge",
            UnorderedOrLessThan => "ult",
            UnorderedOrLessThanOrEqual => "ule",
            UnorderedOrGreaterThan => "ugt",
            UnorderedOrGreaterThanOrEqual => "uge",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INT_CCS: [IntCC; 10] = [
        IntCC::Equal,
        IntCC::NotEqual,
        IntCC::SignedLessThan,
        IntCC::SignedGreaterThanOrEqual,
        IntCC::SignedGreaterThan,
        IntCC::SignedLessThanOrEqual,
        IntCC::UnsignedLessThan,
        IntCC::UnsignedGreaterThanOrEqual,
        IntCC::UnsignedGreaterThan,
        IntCC::UnsignedLessThanOrEqual,
    ];

    const FLOAT_CCS: [FloatCC; 14] = [
        FloatCC::Ordered,
        FloatCC::Unordered,
        FloatCC::Equal,
        FloatCC::NotEqual,
        FloatCC::OrderedNotEqual,
        FloatCC::UnorderedOrEqual,
        FloatCC::LessThan,
        FloatCC::LessThanOrEqual,
        FloatCC::GreaterThan,
        FloatCC::GreaterThanOrEqual,
        FloatCC::UnorderedOrLessThan,
        FloatCC::UnorderedOrLessThanOrEqual,
        FloatCC::UnorderedOrGreaterThan,
        FloatCC::UnorderedOrGreaterThanOrEqual,
    ];

    #[test]
    fn int_cc_complement_is_involution_and_commutes_with_swap() {
        for cc in INT_CCS {
            assert_eq!(cc.complement().complement(), cc);
            assert_eq!(cc.swap_args().swap_args(), cc);
            assert_eq!(cc.complement().swap_args(), cc.swap_args().complement());
        }
    }

    #[test]
    fn int_cc_without_equal_and_unsigned_are_idempotent() {
        for cc in INT_CCS {
            let w = cc.without_equal();
            assert_eq!(w.without_equal(), w);
            let u = cc.unsigned();
            assert_eq!(u.unsigned(), u);
        }
    }

    #[test]
    fn float_cc_complement_and_swap_commute() {
        for cc in FLOAT_CCS {
            assert_eq!(cc.complement().complement(), cc);
            assert_eq!(cc.swap_args().swap_args(), cc);
            assert_eq!(cc.complement().swap_args(), cc.swap_args().complement());
        }
    }

    #[test]
    fn float_cc_fixed_points_of_swap() {
        for cc in [
            FloatCC::Equal,
            FloatCC::NotEqual,
            FloatCC::UnorderedOrEqual,
            FloatCC::OrderedNotEqual,
            FloatCC::Ordered,
            FloatCC::Unordered,
        ] {
            assert_eq!(cc.swap_args(), cc);
        }
    }
}

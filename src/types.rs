//! The scalar/vector type tag attached to every [`Value`](crate::ir::entities::Value).
//!
//! Unlike the recursive, arena-backed type system a managed-runtime IR needs
//! for aggregates and GC references, the core only has to type SSA values
//! for the analyses in this crate (dominance, SSA construction, loop
//! discovery never inspect a value's type beyond equality). A `Type` is
//! therefore a flat 32-bit tag: a lane kind plus a lane count, exactly the
//! shape Cranelift-style backends use.

use std::fmt;

#[cfg(feature = "enable-serde")]
use serde::{Deserialize, Serialize};

/// Scalar element kind carried by a [`Type`]'s lanes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub enum LaneType {
    Int(u16),
    Float32,
    Float64,
}

impl LaneType {
    const fn bits(self) -> u16 {
        match self {
            LaneType::Int(n) => n,
            LaneType::Float32 => 32,
            LaneType::Float64 => 64,
        }
    }
}

/// A value type: a scalar lane kind replicated `lanes` times.
///
/// `lanes == 1` is a plain scalar. `lanes > 1` is a fixed-width SIMD vector.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "enable-serde", derive(Serialize, Deserialize))]
pub struct Type {
    lane: LaneType,
    lanes: u16,
}

impl Type {
    pub const I1: Type = Type::scalar(LaneType::Int(1));
    pub const I8: Type = Type::scalar(LaneType::Int(8));
    pub const I16: Type = Type::scalar(LaneType::Int(16));
    pub const I32: Type = Type::scalar(LaneType::Int(32));
    pub const I64: Type = Type::scalar(LaneType::Int(64));
    pub const I128: Type = Type::scalar(LaneType::Int(128));
    pub const F32: Type = Type::scalar(LaneType::Float32);
    pub const F64: Type = Type::scalar(LaneType::Float64);

    const fn scalar(lane: LaneType) -> Self {
        Type { lane, lanes: 1 }
    }

    /// Build a `lanes`-wide vector of this scalar type.
    ///
    /// Panics if called on an already-vector type or `lanes == 0`.
    pub fn by(self, lanes: u16) -> Type {
        assert_eq!(self.lanes, 1, "`by` expects a scalar base type");
        assert!(lanes > 0, "a vector type needs at least one lane");
        Type {
            lane: self.lane,
            lanes,
        }
    }

    pub const fn is_vector(self) -> bool {
        self.lanes > 1
    }

    pub const fn is_int(self) -> bool {
        matches!(self.lane, LaneType::Int(_))
    }

    pub const fn is_float(self) -> bool {
        matches!(self.lane, LaneType::Float32 | LaneType::Float64)
    }

    pub const fn lane_count(self) -> u16 {
        self.lanes
    }

    pub const fn lane_type(self) -> Type {
        Type {
            lane: self.lane,
            lanes: 1,
        }
    }

    /// Total bit width: lane width times lane count.
    pub const fn bits(self) -> u32 {
        self.lane.bits() as u32 * self.lanes as u32
    }

    /// Map a fixed-width vector type to the `(base_lane_type, lane_count)`
    /// pair consumed by the dynamic-type side table (`DynamicType` scales a
    /// base vector type by a runtime-resolved `GlobalValue`).
    pub fn vector_to_dynamic(self) -> Option<(Type, u16)> {
        if self.is_vector() {
            Some((self.lane_type(), self.lanes))
        } else {
            None
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.lane {
            LaneType::Int(n) => format!("i{n}"),
            LaneType::Float32 => "f32".to_string(),
            LaneType::Float64 => "f64".to_string(),
        };
        if self.lanes > 1 {
            write!(f, "{base}x{}", self.lanes)
        } else {
            f.write_str(&base)
        }
    }
}

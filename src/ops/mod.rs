//! # Kernel modules and operation dispatch
//!
//! This layer owns the elementwise compute behind the array operator
//! protocol, split into two kernel-module sets:
//!
//! - [`cpu`] — the general set: host execution, parallelized with `rayon`
//!   (the fallback for every device combination)
//! - [`cuda`] — the managed-GPU set, selected only when *every* operand
//!   lives on the managed-GPU device; executes through `wgpu` compute
//!   shaders when the `wgpu` feature is enabled and otherwise computes on
//!   the managed (host-visible) block directly
//! - [`dispatch`] — kernel-set selection by operand devices, with the sets
//!   cached process-wide and initialized at most once
//!
//! Operations are a fixed enumeration ([`UnaryKind`], [`BinaryKind`]), not
//! name strings; each kind maps to one kernel entry. Kernels are synchronous
//! black boxes: they return a completed result or an error, and never move
//! data between devices.
//!
//! ## Feature Flags
//!
//! - `wgpu` — enables GPU execution of float binary arithmetic in the
//!   managed set
//! - `cuda` — reserved; currently routes through the `wgpu` backend

pub mod cpu;
pub mod cuda;
pub mod dispatch;
#[cfg(any(feature = "wgpu", feature = "cuda"))]
pub mod wgpu;

/// Unary operations routed through the kernel sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnaryKind {
    Negative,
    Invert,
    Round,
    Trunc,
    Floor,
    Ceil,
    Nearbyint,
    Copy,
    Fabs,
    Acos,
    Acosh,
    Asin,
    Asinh,
    Atan,
    Atanh,
    Cbrt,
    Cos,
    Cosh,
    Erf,
    Erfc,
    Exp,
    Exp2,
    Expm1,
    Lgamma,
    Log,
    Log10,
    Log1p,
    Log2,
    Logb,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
    Tgamma,
}

impl UnaryKind {
    /// The kernel entry name, for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Invert => "invert",
            Self::Round => "round",
            Self::Trunc => "trunc",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Nearbyint => "nearbyint",
            Self::Copy => "copy",
            Self::Fabs => "fabs",
            Self::Acos => "acos",
            Self::Acosh => "acosh",
            Self::Asin => "asin",
            Self::Asinh => "asinh",
            Self::Atan => "atan",
            Self::Atanh => "atanh",
            Self::Cbrt => "cbrt",
            Self::Cos => "cos",
            Self::Cosh => "cosh",
            Self::Erf => "erf",
            Self::Erfc => "erfc",
            Self::Exp => "exp",
            Self::Exp2 => "exp2",
            Self::Expm1 => "expm1",
            Self::Lgamma => "lgamma",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Log1p => "log1p",
            Self::Log2 => "log2",
            Self::Logb => "logb",
            Self::Sin => "sin",
            Self::Sinh => "sinh",
            Self::Sqrt => "sqrt",
            Self::Tan => "tan",
            Self::Tanh => "tanh",
            Self::Tgamma => "tgamma",
        }
    }
}

/// Binary operations routed through the kernel sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryKind {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    GreaterEqual,
    Greater,
    Equaln,
    Add,
    Subtract,
    Multiply,
    Divide,
    FloorDivide,
    Remainder,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
}

impl BinaryKind {
    /// The kernel entry name, for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::NotEqual => "not_equal",
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::GreaterEqual => "greater_equal",
            Self::Greater => "greater",
            Self::Equaln => "equaln",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::FloorDivide => "floor_divide",
            Self::Remainder => "remainder",
            Self::BitwiseAnd => "bitwise_and",
            Self::BitwiseOr => "bitwise_or",
            Self::BitwiseXor => "bitwise_xor",
        }
    }
}

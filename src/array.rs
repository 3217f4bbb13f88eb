//! Numeric arrays: the operator protocol over [`Container`].
//!
//! [`Array`] wraps a container and overlays elementwise operator semantics
//! on it. Every operation resolves to one [`UnaryKind`]/[`BinaryKind`]
//! kernel entry and is routed by [`dispatch::select`] to the kernel set for
//! the operands' devices: the managed-GPU set when every operand is on
//! `cuda:managed`, the general set otherwise.
//!
//! The fallible named methods are the primary API; the `std::ops` operator
//! impls (`+`, `-`, `*`, `/`, `%`, `&`, `|`, `^`, unary `-`/`!`, and the
//! assigning forms) delegate to them and panic with the underlying error
//! message. The assigning forms pass `out = self` and mutate the array's
//! block in place — visible to every view sharing it.
//!
//! Out-parameter law: with `out` supplied the result is written into `out`
//! and `out` is returned; otherwise a fresh array is returned. No operation
//! mutates its receiver unless `out` aliases it.
//!
//! A few operations are explicitly not part of the protocol and fail fast
//! with [`Error::UnsupportedOperation`]: matrix multiplication, power,
//! shifts, `abs`, and coercion to a single scalar.

use core::fmt;
use core::ops;
use std::sync::Arc;

use crate::bridge::BufferExport;
use crate::container::{Container, TypeHints, TypeSpec, fmt_bounded};
use crate::error::{Error, Result};
use crate::ops::dispatch;
use crate::ops::{BinaryKind, UnaryKind};
use crate::value::Value;

/// A container with elementwise operator semantics.
///
/// # Example
/// ```
/// use ragbox::array::Array;
/// use ragbox::container::TypeHints;
/// use ragbox::value::Value;
///
/// let a = Array::new(&Value::from(vec![1.0, 2.0, 3.0]), TypeHints::none(), None).unwrap();
/// let b = Array::new(&Value::from(vec![10.0, 20.0, 30.0]), TypeHints::none(), None).unwrap();
/// let c = (&a + &b).to_value().unwrap();
/// assert_eq!(c, Value::from(vec![11.0, 22.0, 33.0]));
/// ```
#[derive(Debug, Clone)]
pub struct Array {
    inner: Container,
}

macro_rules! unary_out_methods {
    ($(($method:ident, $kind:ident)),+ $(,)?) => {
        $(
            #[doc = concat!("Elementwise `", stringify!($method), "`.")]
            ///
            /// With `out` the result is written into `out` and `out` is
            /// returned.
            pub fn $method(&self, out: Option<&Array>) -> Result<Array> {
                self.unary(UnaryKind::$kind, out)
            }
        )+
    };
}

macro_rules! comparison_methods {
    ($(($method:ident, $kind:ident)),+ $(,)?) => {
        $(
            #[doc = concat!("Elementwise `", stringify!($method), "` comparison, producing a boolean array.")]
            pub fn $method(&self, other: &Array) -> Result<Array> {
                self.binary(BinaryKind::$kind, other)
            }
        )+
    };
}

macro_rules! unsupported_methods {
    ($(($method:ident, $op:literal, $reason:literal)),+ $(,)?) => {
        $(
            #[doc = concat!("Always fails: ", $reason, ".")]
            pub fn $method(&self) -> Result<Array> {
                Err(Error::UnsupportedOperation {
                    op: $op,
                    reason: $reason,
                })
            }
        )+
    };
}

impl Array {
    /// Binds `value` into typed memory; see [`Container::new`].
    pub fn new(value: &Value, hints: TypeHints, device: Option<&str>) -> Result<Self> {
        Container::new(value, hints, device).map(Self::from)
    }

    /// Allocates a zero-initialized array; see [`Container::empty`].
    pub fn empty(ty: impl Into<TypeSpec>, device: Option<&str>) -> Result<Self> {
        Container::empty(ty, device).map(Self::from)
    }

    /// Zero-copy unchecked buffer import; see
    /// [`Container::from_buffer_unchecked`].
    pub fn from_buffer_unchecked(
        exporter: Arc<dyn BufferExport>,
        ty: impl Into<TypeSpec>,
    ) -> Result<Self> {
        Container::from_buffer_unchecked(exporter, ty).map(Self::from)
    }

    /// Validated zero-copy buffer import; see [`Container::from_buffer`].
    pub fn from_buffer(exporter: Arc<dyn BufferExport>, ty: impl Into<TypeSpec>) -> Result<Self> {
        Container::from_buffer(exporter, ty).map(Self::from)
    }

    /// The underlying container.
    pub fn container(&self) -> &Container {
        &self.inner
    }

    /// Unwraps into the underlying container.
    pub fn into_container(self) -> Container {
        self.inner
    }

    /// Reads the stored value back out.
    pub fn to_value(&self) -> Result<Value> {
        self.inner.value()
    }

    // --- dispatch ---

    /// Routes one unary operation to the kernel set for this array's
    /// device.
    pub fn unary(&self, op: UnaryKind, out: Option<&Array>) -> Result<Array> {
        let module = dispatch::select([self.inner.device()]);
        module
            .unary(op, &self.inner, out.map(Array::container))
            .map(Self::from)
    }

    /// Routes one binary operation to the kernel set for the operands'
    /// devices, returning a fresh array.
    pub fn binary(&self, op: BinaryKind, other: &Array) -> Result<Array> {
        let module = dispatch::select([self.inner.device(), other.inner.device()]);
        module
            .binary(op, &self.inner, &other.inner, None)
            .map(Self::from)
    }

    /// Like [`binary`](Self::binary), writing the result into `out`.
    pub fn binary_into(&self, op: BinaryKind, other: &Array, out: &Array) -> Result<Array> {
        let module = dispatch::select([self.inner.device(), other.inner.device()]);
        module
            .binary(op, &self.inner, &other.inner, Some(&out.inner))
            .map(Self::from)
    }

    /// The in-place form: `out = self`. The receiver's block is overwritten
    /// and a view of it is returned.
    pub fn binary_in_place(&self, op: BinaryKind, other: &Array) -> Result<Array> {
        self.binary_into(op, other, self)
    }

    // --- unary surface ---

    /// Elementwise negation.
    pub fn negative(&self) -> Result<Array> {
        self.unary(UnaryKind::Negative, None)
    }

    /// The identity, as a copy.
    pub fn positive(&self) -> Result<Array> {
        self.copy(None)
    }

    /// Elementwise bitwise/logical inversion.
    pub fn invert(&self) -> Result<Array> {
        self.unary(UnaryKind::Invert, None)
    }

    /// Rounds half away from zero.
    pub fn round(&self) -> Result<Array> {
        self.unary(UnaryKind::Round, None)
    }

    /// Truncates toward zero.
    pub fn trunc(&self) -> Result<Array> {
        self.unary(UnaryKind::Trunc, None)
    }

    /// Rounds toward negative infinity.
    pub fn floor(&self) -> Result<Array> {
        self.unary(UnaryKind::Floor, None)
    }

    /// Rounds toward positive infinity.
    pub fn ceil(&self) -> Result<Array> {
        self.unary(UnaryKind::Ceil, None)
    }

    unary_out_methods![
        (copy, Copy),
        (nearbyint, Nearbyint),
        (fabs, Fabs),
        (acos, Acos),
        (acosh, Acosh),
        (asin, Asin),
        (asinh, Asinh),
        (atan, Atan),
        (atanh, Atanh),
        (cbrt, Cbrt),
        (cos, Cos),
        (cosh, Cosh),
        (erf, Erf),
        (erfc, Erfc),
        (exp, Exp),
        (exp2, Exp2),
        (expm1, Expm1),
        (lgamma, Lgamma),
        (log, Log),
        (log10, Log10),
        (log1p, Log1p),
        (log2, Log2),
        (logb, Logb),
        (sin, Sin),
        (sinh, Sinh),
        (sqrt, Sqrt),
        (tan, Tan),
        (tanh, Tanh),
        (tgamma, Tgamma),
    ];

    // --- binary surface ---

    comparison_methods![
        (equal, Equal),
        (not_equal, NotEqual),
        (less, Less),
        (less_equal, LessEqual),
        (greater_equal, GreaterEqual),
        (greater, Greater),
    ];

    /// Elementwise equality that treats NaN as equal to NaN.
    ///
    /// With `out` the result is written into `out` and `out` is returned.
    pub fn equaln(&self, other: &Array, out: Option<&Array>) -> Result<Array> {
        match out {
            Some(dst) => self.binary_into(BinaryKind::Equaln, other, dst),
            None => self.binary(BinaryKind::Equaln, other),
        }
    }

    /// Elementwise floor division.
    pub fn floor_divide(&self, other: &Array) -> Result<Array> {
        self.binary(BinaryKind::FloorDivide, other)
    }

    /// Elementwise remainder; the sign follows the divisor.
    pub fn remainder(&self, other: &Array) -> Result<Array> {
        self.binary(BinaryKind::Remainder, other)
    }

    /// Elementwise `(floor_divide, remainder)` pair.
    pub fn divmod(&self, other: &Array) -> Result<(Array, Array)> {
        let quotient = self.binary(BinaryKind::FloorDivide, other)?;
        let remainder = self.binary(BinaryKind::Remainder, other)?;
        Ok((quotient, remainder))
    }

    /// In-place divmod: the quotient is written into `self`, the remainder
    /// is returned fresh.
    pub fn divmod_in_place(&self, other: &Array) -> Result<(Array, Array)> {
        // The remainder must be taken before the quotient overwrites self.
        let remainder = self.binary(BinaryKind::Remainder, other)?;
        let quotient = self.binary_in_place(BinaryKind::FloorDivide, other)?;
        Ok((quotient, remainder))
    }

    // --- explicitly unsupported surface ---

    unsupported_methods![
        (abs, "abs", "abs() is not implemented"),
        (to_bool, "bool conversion", "the truth value of an array is ambiguous"),
        (to_int, "int conversion", "int() is not supported"),
        (to_float, "float conversion", "float() is not supported"),
        (to_complex, "complex conversion", "complex() is not supported"),
        (to_index, "index conversion", "index() is not supported"),
    ];

    /// Always fails: matrix multiplication is not implemented.
    pub fn matmul(&self, _other: &Array) -> Result<Array> {
        Err(Error::UnsupportedOperation {
            op: "matmul",
            reason: "matrix multiplication is not implemented",
        })
    }

    /// Always fails: in-place matrix multiplication is not implemented.
    pub fn matmul_in_place(&self, _other: &Array) -> Result<Array> {
        Err(Error::UnsupportedOperation {
            op: "matmul",
            reason: "inplace matrix multiplication is not implemented",
        })
    }

    /// Always fails: power is not implemented.
    pub fn power(&self, _other: &Array) -> Result<Array> {
        Err(Error::UnsupportedOperation {
            op: "power",
            reason: "power is not implemented",
        })
    }

    /// Always fails: in-place power is not implemented.
    pub fn power_in_place(&self, _other: &Array) -> Result<Array> {
        Err(Error::UnsupportedOperation {
            op: "power",
            reason: "inplace power is not implemented",
        })
    }

    /// Always fails: the `<<` operator is not supported.
    pub fn shift_left(&self, _other: &Array) -> Result<Array> {
        Err(Error::UnsupportedOperation {
            op: "shift_left",
            reason: "the '<<' operator is not supported",
        })
    }

    /// Always fails: the `>>` operator is not supported.
    pub fn shift_right(&self, _other: &Array) -> Result<Array> {
        Err(Error::UnsupportedOperation {
            op: "shift_right",
            reason: "the '>>' operator is not supported",
        })
    }
}

impl From<Container> for Array {
    fn from(inner: Container) -> Self {
        Self { inner }
    }
}

impl ops::Deref for Array {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.inner
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "array(")?;
        match self.inner.value() {
            Ok(v) => fmt_bounded(&v, f, 10)?,
            Err(_) => write!(f, "<unreadable>")?,
        }
        write!(f, ", type=\"{}\")", self.inner.ty())
    }
}

macro_rules! binop_impls {
    ($(($trait:ident, $method:ident, $kind:ident, $sym:literal)),+ $(,)?) => {
        $(
            impl ops::$trait<&Array> for &Array {
                type Output = Array;

                #[doc = concat!("Elementwise `", $sym, "`.")]
                ///
                /// # Panics
                /// Panics when the underlying kernel reports an error; use
                /// [`Array::binary`] for the fallible form.
                fn $method(self, rhs: &Array) -> Array {
                    self.binary(BinaryKind::$kind, rhs)
                        .unwrap_or_else(|e| panic!("{e}"))
                }
            }
        )+
    };
}

binop_impls![
    (Add, add, Add, "+"),
    (Sub, sub, Subtract, "-"),
    (Mul, mul, Multiply, "*"),
    (Div, div, Divide, "/"),
    (Rem, rem, Remainder, "%"),
    (BitAnd, bitand, BitwiseAnd, "&"),
    (BitOr, bitor, BitwiseOr, "|"),
    (BitXor, bitxor, BitwiseXor, "^"),
];

macro_rules! binop_assign_impls {
    ($(($trait:ident, $method:ident, $kind:ident, $sym:literal)),+ $(,)?) => {
        $(
            impl ops::$trait<&Array> for Array {
                #[doc = concat!("In-place elementwise `", $sym, "`, writing through the shared block.")]
                ///
                /// # Panics
                /// Panics when the underlying kernel reports an error; use
                /// [`Array::binary_in_place`] for the fallible form.
                fn $method(&mut self, rhs: &Array) {
                    self.binary_in_place(BinaryKind::$kind, rhs)
                        .map(drop)
                        .unwrap_or_else(|e| panic!("{e}"));
                }
            }
        )+
    };
}

binop_assign_impls![
    (AddAssign, add_assign, Add, "+="),
    (SubAssign, sub_assign, Subtract, "-="),
    (MulAssign, mul_assign, Multiply, "*="),
    (DivAssign, div_assign, Divide, "/="),
    (RemAssign, rem_assign, Remainder, "%="),
    (BitAndAssign, bitand_assign, BitwiseAnd, "&="),
    (BitOrAssign, bitor_assign, BitwiseOr, "|="),
    (BitXorAssign, bitxor_assign, BitwiseXor, "^="),
];

impl ops::Neg for &Array {
    type Output = Array;

    /// Elementwise negation.
    ///
    /// # Panics
    /// Panics when the underlying kernel reports an error; use
    /// [`Array::negative`] for the fallible form.
    fn neg(self) -> Array {
        self.negative().unwrap_or_else(|e| panic!("{e}"))
    }
}

impl ops::Not for &Array {
    type Output = Array;

    /// Elementwise inversion.
    ///
    /// # Panics
    /// Panics when the underlying kernel reports an error; use
    /// [`Array::invert`] for the fallible form.
    fn not(self) -> Array {
        self.invert().unwrap_or_else(|e| panic!("{e}"))
    }
}

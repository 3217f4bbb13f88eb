//! General kernel set: host execution.
//!
//! These kernels are the default target of dispatch and the fallback for
//! every device combination: all blocks this crate allocates are
//! host-visible, so operands on different devices are reconciled here
//! without any data movement. Elementwise loops are parallelized with
//! [`rayon`](https://docs.rs/rayon).
//!
//! Promotion rules:
//!
//! - float inputs keep their float kind; transcendentals on integer inputs
//!   produce `float64`
//! - the dtype-preserving operations (add, subtract, multiply, floor
//!   divide, remainder, bitwise) require both operands to share one element
//!   kind, and integer results wrap at the element width
//! - `divide` always produces a float
//! - comparisons produce `bool`
//!
//! Kernels require fixed, concrete shapes with plain scalar elements and
//! equal operand shapes; no broadcasting.

use rayon::prelude::*;

use crate::container::Container;
use crate::device::DeviceSpec;
use crate::error::{Error, Result};
use crate::mem::{self, Storage};
use crate::ops::{BinaryKind, UnaryKind};
use crate::types::{self, DataType, ScalarKind};

fn kernel_error(op: &'static str, reason: impl Into<String>) -> Error {
    Error::TypeMismatch {
        context: op.to_string(),
        reason: reason.into(),
    }
}

/// Writes a finished result either into `out` (returned) or into a fresh
/// container.
fn deliver(
    ty: DataType,
    bytes: Vec<u8>,
    device: Option<DeviceSpec>,
    out: Option<&Container>,
) -> Result<Container> {
    match out {
        Some(dst) => {
            if dst.ty() != &ty {
                return Err(Error::TypeMismatch {
                    context: dst.ty().to_string(),
                    reason: format!("output type does not match result type '{ty}'"),
                });
            }
            dst.write_block(&bytes)?;
            Ok(dst.clone())
        }
        None => Ok(Container::from_parts(ty, Storage::owned(bytes), device)),
    }
}

fn float_result_kind(kind: ScalarKind) -> ScalarKind {
    if kind == ScalarKind::Float32 {
        ScalarKind::Float32
    } else {
        ScalarKind::Float64
    }
}

fn float_fn(op: UnaryKind) -> fn(f64) -> f64 {
    use UnaryKind as U;
    match op {
        U::Round => f64::round,
        U::Trunc => f64::trunc,
        U::Floor => f64::floor,
        U::Ceil => f64::ceil,
        U::Nearbyint => libm::rint,
        U::Fabs => f64::abs,
        U::Acos => f64::acos,
        U::Acosh => f64::acosh,
        U::Asin => f64::asin,
        U::Asinh => f64::asinh,
        U::Atan => f64::atan,
        U::Atanh => f64::atanh,
        U::Cbrt => f64::cbrt,
        U::Cos => f64::cos,
        U::Cosh => f64::cosh,
        U::Erf => libm::erf,
        U::Erfc => libm::erfc,
        U::Exp => f64::exp,
        U::Exp2 => f64::exp2,
        U::Expm1 => f64::exp_m1,
        U::Lgamma => libm::lgamma,
        U::Log => f64::ln,
        U::Log10 => f64::log10,
        U::Log1p => f64::ln_1p,
        U::Log2 => f64::log2,
        U::Logb => |x| libm::ilogb(x) as f64,
        U::Sin => f64::sin,
        U::Sinh => f64::sinh,
        U::Sqrt => f64::sqrt,
        U::Tan => f64::tan,
        U::Tanh => f64::tanh,
        U::Tgamma => libm::tgamma,
        U::Negative | U::Invert | U::Copy => unreachable!("not a float map"),
    }
}

/// Runs one unary kernel.
pub(crate) fn unary(op: UnaryKind, x: &Container, out: Option<&Container>) -> Result<Container> {
    use UnaryKind as U;
    let kind = x.elem_kind()?;
    x.shape()?;
    let device = x.device().cloned();

    match op {
        U::Copy => {
            let bytes = x.storage().with_bytes(<[u8]>::to_vec);
            deliver(x.ty().clone(), bytes, device, out)
        }
        U::Negative => {
            if kind.is_float() {
                let lanes = x.f64_lanes()?;
                let mapped: Vec<f64> = lanes.par_iter().map(|&v| -v).collect();
                deliver(x.ty().clone(), mem::pack_f64(kind, &mapped)?, device, out)
            } else if kind.is_signed_int() {
                let lanes = x.i64_lanes()?;
                let mapped: Vec<i64> = lanes.par_iter().map(|&v| v.wrapping_neg()).collect();
                deliver(x.ty().clone(), mem::pack_i64(kind, &mapped)?, device, out)
            } else {
                Err(kernel_error(
                    op.name(),
                    format!("cannot negate '{}' elements", kind.name()),
                ))
            }
        }
        U::Invert => {
            if kind == ScalarKind::Bool {
                let lanes = x.bool_lanes()?;
                let mapped: Vec<bool> = lanes.par_iter().map(|&b| !b).collect();
                deliver(x.ty().clone(), mem::pack_bool(&mapped), device, out)
            } else if kind.is_int() {
                let lanes = x.i64_lanes()?;
                let mapped: Vec<i64> = lanes.par_iter().map(|&v| !v).collect();
                deliver(x.ty().clone(), mem::pack_i64(kind, &mapped)?, device, out)
            } else {
                Err(kernel_error(
                    op.name(),
                    format!("cannot invert '{}' elements", kind.name()),
                ))
            }
        }
        U::Round | U::Trunc | U::Floor | U::Ceil | U::Nearbyint => {
            if kind.is_int() {
                // Rounding an integer is the identity.
                let bytes = x.storage().with_bytes(<[u8]>::to_vec);
                deliver(x.ty().clone(), bytes, device, out)
            } else if kind.is_float() {
                let f = float_fn(op);
                let lanes = x.f64_lanes()?;
                let mapped: Vec<f64> = lanes.par_iter().map(|&v| f(v)).collect();
                deliver(x.ty().clone(), mem::pack_f64(kind, &mapped)?, device, out)
            } else {
                Err(kernel_error(
                    op.name(),
                    format!("requires numeric elements, got '{}'", kind.name()),
                ))
            }
        }
        _ => {
            if !kind.is_numeric() {
                return Err(kernel_error(
                    op.name(),
                    format!("requires numeric elements, got '{}'", kind.name()),
                ));
            }
            let result_kind = float_result_kind(kind);
            let ty = types::replace_dtype(x.ty(), &DataType::Scalar(result_kind))?;
            let f = float_fn(op);
            let lanes = x.f64_lanes()?;
            let mapped: Vec<f64> = lanes.par_iter().map(|&v| f(v)).collect();
            deliver(ty, mem::pack_f64(result_kind, &mapped)?, device, out)
        }
    }
}

/// Python-style floor division, rounding toward negative infinity.
fn floor_div_i64(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && (a < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Remainder whose sign follows the divisor (pairs with [`floor_div_i64`]).
fn floor_rem_i64(a: i64, b: i64) -> i64 {
    a.wrapping_sub(floor_div_i64(a, b).wrapping_mul(b))
}

fn floor_div_f64(a: f64, b: f64) -> f64 {
    (a / b).floor()
}

fn floor_rem_f64(a: f64, b: f64) -> f64 {
    a - b * (a / b).floor()
}

fn require_same_kind(op: BinaryKind, ka: ScalarKind, kb: ScalarKind) -> Result<ScalarKind> {
    if ka == kb {
        Ok(ka)
    } else {
        Err(kernel_error(
            op.name(),
            format!(
                "operand element types differ: '{}' vs '{}'",
                ka.name(),
                kb.name()
            ),
        ))
    }
}

/// Runs one binary kernel.
pub(crate) fn binary(
    op: BinaryKind,
    a: &Container,
    b: &Container,
    out: Option<&Container>,
) -> Result<Container> {
    use BinaryKind as B;
    let shape_a = a.shape()?;
    let shape_b = b.shape()?;
    if shape_a != shape_b {
        return Err(kernel_error(
            op.name(),
            format!("operand shapes differ: {shape_a:?} vs {shape_b:?}"),
        ));
    }
    let ka = a.elem_kind()?;
    let kb = b.elem_kind()?;
    let device = a.device().cloned();

    match op {
        B::Equal | B::NotEqual | B::Less | B::LessEqual | B::GreaterEqual | B::Greater
        | B::Equaln => {
            let ty = types::replace_dtype(a.ty(), &DataType::Scalar(ScalarKind::Bool))?;
            let flags: Vec<bool> = if ka.is_int() && kb.is_int() {
                let la = a.i64_lanes()?;
                let lb = b.i64_lanes()?;
                let f = int_compare_fn(op);
                la.par_iter().zip(lb.par_iter()).map(|(&x, &y)| f(x, y)).collect()
            } else if ka == ScalarKind::Bool && kb == ScalarKind::Bool {
                let la = a.bool_lanes()?;
                let lb = b.bool_lanes()?;
                let f = int_compare_fn(op);
                la.par_iter()
                    .zip(lb.par_iter())
                    .map(|(&x, &y)| f(i64::from(x), i64::from(y)))
                    .collect()
            } else if ka.is_numeric() && kb.is_numeric() {
                let la = a.f64_lanes()?;
                let lb = b.f64_lanes()?;
                let f = float_compare_fn(op);
                la.par_iter().zip(lb.par_iter()).map(|(&x, &y)| f(x, y)).collect()
            } else {
                return Err(kernel_error(
                    op.name(),
                    format!(
                        "cannot compare '{}' with '{}'",
                        ka.name(),
                        kb.name()
                    ),
                ));
            };
            deliver(ty, mem::pack_bool(&flags), device, out)
        }
        B::Add | B::Subtract | B::Multiply | B::FloorDivide | B::Remainder => {
            let kind = require_same_kind(op, ka, kb)?;
            if kind.is_float() {
                let la = a.f64_lanes()?;
                let lb = b.f64_lanes()?;
                let f: fn(f64, f64) -> f64 = match op {
                    B::Add => |x, y| x + y,
                    B::Subtract => |x, y| x - y,
                    B::Multiply => |x, y| x * y,
                    B::FloorDivide => floor_div_f64,
                    _ => floor_rem_f64,
                };
                let mapped: Vec<f64> =
                    la.par_iter().zip(lb.par_iter()).map(|(&x, &y)| f(x, y)).collect();
                deliver(a.ty().clone(), mem::pack_f64(kind, &mapped)?, device, out)
            } else if kind.is_int() {
                let la = a.i64_lanes()?;
                let lb = b.i64_lanes()?;
                if matches!(op, B::FloorDivide | B::Remainder) && lb.contains(&0) {
                    return Err(kernel_error(op.name(), "integer division by zero"));
                }
                let f: fn(i64, i64) -> i64 = match op {
                    B::Add => i64::wrapping_add,
                    B::Subtract => i64::wrapping_sub,
                    B::Multiply => i64::wrapping_mul,
                    B::FloorDivide => floor_div_i64,
                    _ => floor_rem_i64,
                };
                let mapped: Vec<i64> =
                    la.par_iter().zip(lb.par_iter()).map(|(&x, &y)| f(x, y)).collect();
                deliver(a.ty().clone(), mem::pack_i64(kind, &mapped)?, device, out)
            } else {
                Err(kernel_error(
                    op.name(),
                    format!("requires numeric elements, got '{}'", kind.name()),
                ))
            }
        }
        B::Divide => {
            let kind = require_same_kind(op, ka, kb)?;
            if !kind.is_numeric() {
                return Err(kernel_error(
                    op.name(),
                    format!("requires numeric elements, got '{}'", kind.name()),
                ));
            }
            let result_kind = float_result_kind(kind);
            let ty = types::replace_dtype(a.ty(), &DataType::Scalar(result_kind))?;
            let la = a.f64_lanes()?;
            let lb = b.f64_lanes()?;
            let mapped: Vec<f64> =
                la.par_iter().zip(lb.par_iter()).map(|(&x, &y)| x / y).collect();
            deliver(ty, mem::pack_f64(result_kind, &mapped)?, device, out)
        }
        B::BitwiseAnd | B::BitwiseOr | B::BitwiseXor => {
            let kind = require_same_kind(op, ka, kb)?;
            if kind == ScalarKind::Bool {
                let la = a.bool_lanes()?;
                let lb = b.bool_lanes()?;
                let f: fn(bool, bool) -> bool = match op {
                    B::BitwiseAnd => |x, y| x & y,
                    B::BitwiseOr => |x, y| x | y,
                    _ => |x, y| x ^ y,
                };
                let mapped: Vec<bool> =
                    la.par_iter().zip(lb.par_iter()).map(|(&x, &y)| f(x, y)).collect();
                deliver(a.ty().clone(), mem::pack_bool(&mapped), device, out)
            } else if kind.is_int() {
                let la = a.i64_lanes()?;
                let lb = b.i64_lanes()?;
                let f: fn(i64, i64) -> i64 = match op {
                    B::BitwiseAnd => |x, y| x & y,
                    B::BitwiseOr => |x, y| x | y,
                    _ => |x, y| x ^ y,
                };
                let mapped: Vec<i64> =
                    la.par_iter().zip(lb.par_iter()).map(|(&x, &y)| f(x, y)).collect();
                deliver(a.ty().clone(), mem::pack_i64(kind, &mapped)?, device, out)
            } else {
                Err(kernel_error(
                    op.name(),
                    format!("requires integer or boolean elements, got '{}'", kind.name()),
                ))
            }
        }
    }
}

fn int_compare_fn(op: BinaryKind) -> fn(i64, i64) -> bool {
    use BinaryKind as B;
    match op {
        B::Equal | B::Equaln => |x, y| x == y,
        B::NotEqual => |x, y| x != y,
        B::Less => |x, y| x < y,
        B::LessEqual => |x, y| x <= y,
        B::GreaterEqual => |x, y| x >= y,
        _ => |x, y| x > y,
    }
}

fn float_compare_fn(op: BinaryKind) -> fn(f64, f64) -> bool {
    use BinaryKind as B;
    match op {
        B::Equal => |x, y| x == y,
        // NaN compares equal to NaN.
        B::Equaln => |x, y| x == y || (x.is_nan() && y.is_nan()),
        B::NotEqual => |x, y| x != y,
        B::Less => |x, y| x < y,
        B::LessEqual => |x, y| x <= y,
        B::GreaterEqual => |x, y| x >= y,
        _ => |x, y| x > y,
    }
}

/// Packs float lanes produced by an accelerated path, applying the same
/// result-type rules as the host kernels.
#[cfg(any(feature = "wgpu", feature = "cuda"))]
pub(crate) fn deliver_float_binary(
    op: BinaryKind,
    a: &Container,
    lanes: Vec<f64>,
    out: Option<&Container>,
) -> Result<Container> {
    let kind = a.elem_kind()?;
    let result_kind = if op == BinaryKind::Divide {
        float_result_kind(kind)
    } else {
        kind
    };
    let ty = types::replace_dtype(a.ty(), &DataType::Scalar(result_kind))?;
    deliver(
        ty,
        mem::pack_f64(result_kind, &lanes)?,
        a.device().cloned(),
        out,
    )
}

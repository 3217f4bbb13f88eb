//! Structural and value type inference.
//!
//! Given a host [`Value`], inference produces the concrete [`DataType`] the
//! value must be stored as: fixed dimensions where all sibling lengths agree,
//! ragged (`var`) dimensions where they differ, scalar dtype unification
//! (`int64` + `float64` widens to `float64`), records field by field, and
//! optional types where missing values appear. An optional element-type hint
//! constrains the innermost dtype instead of inferring it.
//!
//! A shortcut fast path handles the common case of homogeneous fixed-shape
//! numeric nests without building intermediate per-element types.

use crate::error::{Error, Result};
use crate::types::{DataType, ScalarKind};
use crate::value::Value;

/// Infers the concrete type of `value`.
///
/// `dtype` constrains the innermost element type; `shortcut` enables the
/// homogeneous fast path.
///
/// # Example
/// ```
/// use ragbox::infer::infer;
/// use ragbox::value::Value;
/// let v = Value::from(vec![vec![1, 2, 3], vec![4]]);
/// assert_eq!(infer(&v, None, true).unwrap().to_string(), "var * var * int64");
/// ```
pub fn infer(value: &Value, dtype: Option<&DataType>, shortcut: bool) -> Result<DataType> {
    if shortcut && dtype.is_none() {
        if let Some(ty) = shortcut_fixed(value) {
            return Ok(ty);
        }
    }
    infer_full(value, dtype)
}

/// Fast path: uniform nests of same-kind numeric scalars.
///
/// Returns `None` whenever anything non-uniform or non-numeric shows up; the
/// full path then takes over.
fn shortcut_fixed(value: &Value) -> Option<DataType> {
    let mut dims = Vec::new();
    let mut v = value;
    loop {
        match v {
            Value::List(items) => {
                let first = items.first()?;
                dims.push(items.len());
                v = first;
            }
            Value::Int(_) | Value::Float(_) => break,
            _ => return None,
        }
    }
    let kind = probe_uniform(value, &dims, 0)?;
    let mut ty = DataType::Scalar(kind);
    for size in dims.into_iter().rev() {
        ty = DataType::FixedDim {
            size,
            elem: Box::new(ty),
        };
    }
    Some(ty)
}

fn probe_uniform(v: &Value, dims: &[usize], depth: usize) -> Option<ScalarKind> {
    match v {
        Value::List(items) => {
            if depth >= dims.len() || items.len() != dims[depth] {
                return None;
            }
            let mut kind = None;
            for item in items {
                let k = probe_uniform(item, dims, depth + 1)?;
                match kind {
                    None => kind = Some(k),
                    Some(prev) if prev == k => {}
                    Some(_) => return None,
                }
            }
            kind
        }
        Value::Int(_) if depth == dims.len() => Some(ScalarKind::Int64),
        Value::Float(_) if depth == dims.len() => Some(ScalarKind::Float64),
        _ => None,
    }
}

fn infer_full(value: &Value, dtype: Option<&DataType>) -> Result<DataType> {
    match value {
        Value::List(items) => {
            if items.is_empty() {
                return match dtype {
                    Some(dt) => Ok(DataType::FixedDim {
                        size: 0,
                        elem: Box::new(dt.clone()),
                    }),
                    None => Err(Error::TypeMismatch {
                        context: "[]".to_string(),
                        reason: "cannot infer the element type of an empty sequence"
                            .to_string(),
                    }),
                };
            }
            let mut elem: Option<DataType> = None;
            for item in items {
                let t = infer_full(item, dtype)?;
                elem = Some(match elem {
                    None => t,
                    Some(prev) => unify(prev, t)?,
                });
            }
            let elem = elem.unwrap();
            // Sibling lists of differing lengths unified to a var element;
            // ragged dimensions must nest, so the outer dimension goes var
            // as well. Scalar widening alone keeps the dimension fixed.
            if matches!(elem, DataType::VarDim { .. }) {
                Ok(DataType::VarDim {
                    elem: Box::new(elem),
                })
            } else {
                Ok(DataType::FixedDim {
                    size: items.len(),
                    elem: Box::new(elem),
                })
            }
        }
        Value::Record(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for (name, v) in fields {
                out.push((name.clone(), infer_full(v, dtype)?));
            }
            Ok(DataType::Record(out))
        }
        // A lone missing value has no element type of its own; `Any` is
        // filled in by unification with its siblings (or by the hint).
        Value::None => match dtype {
            Some(dt) => Ok(DataType::Optional(Box::new(dt.clone()))),
            None => Ok(DataType::Optional(Box::new(DataType::Any))),
        },
        scalar => match dtype {
            Some(dt) => {
                check_scalar_hint(scalar, dt)?;
                Ok(dt.clone())
            }
            None => Ok(DataType::Scalar(scalar_kind_of(scalar)?)),
        },
    }
}

fn scalar_kind_of(v: &Value) -> Result<ScalarKind> {
    Ok(match v {
        Value::Bool(_) => ScalarKind::Bool,
        Value::Int(_) => ScalarKind::Int64,
        Value::UInt(_) => ScalarKind::UInt64,
        Value::Float(_) => ScalarKind::Float64,
        Value::Str(_) => ScalarKind::String,
        other => {
            return Err(Error::TypeMismatch {
                context: other.to_string(),
                reason: format!("{} is not a scalar value", other.kind_name()),
            });
        }
    })
}

fn check_scalar_hint(v: &Value, dt: &DataType) -> Result<()> {
    let ok = match dt {
        DataType::Scalar(kind) => match v {
            Value::Bool(_) => *kind == ScalarKind::Bool,
            Value::Int(_) | Value::UInt(_) => kind.is_numeric(),
            Value::Float(_) => kind.is_float(),
            Value::Str(_) => *kind == ScalarKind::String,
            _ => false,
        },
        DataType::Optional(inner) => return check_scalar_hint(v, inner),
        DataType::Categorical(_) => matches!(v, Value::Str(_) | Value::None),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            context: dt.to_string(),
            reason: format!("{} cannot be stored as this element type", v.kind_name()),
        })
    }
}

/// Unifies two sibling element types into one that can represent both.
fn unify(a: DataType, b: DataType) -> Result<DataType> {
    if a == b {
        return Ok(a);
    }
    match (a, b) {
        (DataType::Any, other) | (other, DataType::Any) => Ok(other),
        (
            DataType::FixedDim { size: sa, elem: ea },
            DataType::FixedDim { size: sb, elem: eb },
        ) => {
            let elem = Box::new(unify(*ea, *eb)?);
            if sa == sb {
                Ok(DataType::FixedDim { size: sa, elem })
            } else {
                Ok(DataType::VarDim { elem })
            }
        }
        (DataType::VarDim { elem: ea }, DataType::VarDim { elem: eb }) => {
            Ok(DataType::VarDim {
                elem: Box::new(unify(*ea, *eb)?),
            })
        }
        (DataType::VarDim { elem: ea }, DataType::FixedDim { elem: eb, .. })
        | (DataType::FixedDim { elem: ea, .. }, DataType::VarDim { elem: eb }) => {
            Ok(DataType::VarDim {
                elem: Box::new(unify(*ea, *eb)?),
            })
        }
        (DataType::Optional(ea), DataType::Optional(eb)) => {
            Ok(DataType::Optional(Box::new(unify(*ea, *eb)?)))
        }
        (DataType::Optional(ea), other) | (other, DataType::Optional(ea)) => {
            Ok(DataType::Optional(Box::new(unify(*ea, other)?)))
        }
        (DataType::Scalar(ka), DataType::Scalar(kb)) => {
            let unified = unify_scalars(ka, kb).ok_or_else(|| Error::TypeMismatch {
                context: format!("{} and {}", ka.name(), kb.name()),
                reason: "sibling values have incompatible element types".to_string(),
            })?;
            Ok(DataType::Scalar(unified))
        }
        (a, b) => Err(Error::TypeMismatch {
            context: format!("{a} and {b}"),
            reason: "sibling values have incompatible types".to_string(),
        }),
    }
}

fn unify_scalars(a: ScalarKind, b: ScalarKind) -> Option<ScalarKind> {
    use ScalarKind::{Float64, Int64, UInt64};
    if a == b {
        return Some(a);
    }
    match (a, b) {
        (Int64, Float64) | (Float64, Int64) => Some(Float64),
        (UInt64, Float64) | (Float64, UInt64) => Some(Float64),
        (Int64, UInt64) | (UInt64, Int64) => Some(UInt64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_nest() {
        let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        assert_eq!(infer(&v, None, true).unwrap().to_string(), "2 * 3 * int64");
    }

    #[test]
    fn ragged_nest() {
        let v = Value::from(vec![vec![1, 2, 3], vec![4]]);
        assert_eq!(
            infer(&v, None, true).unwrap().to_string(),
            "var * var * int64"
        );
    }

    #[test]
    fn mixed_numerics_widen() {
        let v = Value::List(vec![Value::Int(1), Value::Float(2.5)]);
        assert_eq!(infer(&v, None, true).unwrap().to_string(), "2 * float64");
    }

    #[test]
    fn missing_values_become_optional() {
        let v = Value::List(vec![Value::Int(1), Value::None, Value::Int(3)]);
        let hint = DataType::Scalar(ScalarKind::Int64);
        assert_eq!(
            infer(&v, Some(&hint), false).unwrap().to_string(),
            "3 * ?int64"
        );
    }

    #[test]
    fn missing_without_hint_unifies_with_siblings() {
        let v = Value::List(vec![Value::Int(1), Value::None, Value::Int(3)]);
        assert_eq!(infer(&v, None, true).unwrap().to_string(), "3 * ?int64");
    }

    #[test]
    fn record_inference() {
        let v = Value::record([("a", Value::from("xyz")), ("b", Value::from(vec![1, 2, 3]))]);
        assert_eq!(
            infer(&v, None, true).unwrap().to_string(),
            "{a : string, b : 3 * int64}"
        );
    }

    #[test]
    fn dtype_hint_constrains_leaf() {
        let v = Value::from(vec![vec![1, 2], vec![3, 4]]);
        let hint = DataType::Scalar(ScalarKind::Float32);
        assert_eq!(
            infer(&v, Some(&hint), true).unwrap().to_string(),
            "2 * 2 * float32"
        );
    }
}

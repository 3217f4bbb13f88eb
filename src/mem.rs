//! Native typed-memory engine.
//!
//! Owns the byte-level layout: binding host values into typed blocks,
//! zero-filled allocation, read-back, and the raw element lanes the kernel
//! modules compute on.
//!
//! # Layout
//!
//! Blocks are densely packed, row-major, little-endian and self-describing:
//!
//! - fixed dimensions: elements in sequence
//! - ragged dimensions: a `u64` count followed by the elements
//! - strings: a `u64` byte length followed by UTF-8 data
//! - optional: a 1-byte presence tag, then the payload (zero-filled when
//!   missing)
//! - categorical: one `u8` level index per element
//! - records: fields in declaration order
//!
//! A block is either owned (shared between views, mutation visible to every
//! sharer, no copy-on-write) or a zero-copy region borrowed from an external
//! buffer exporter, which is never freed or written by this crate.

use std::sync::{Arc, PoisonError, RwLock};

use crate::bridge::BufferExport;
use crate::error::{Error, Result};
use crate::types::{DataType, ScalarKind};
use crate::value::Value;

/// The memory behind a container.
#[derive(Clone)]
pub(crate) enum Storage {
    /// A shared, mutable, owned block.
    Owned(Arc<RwLock<Vec<u8>>>),
    /// A read-only region kept alive through its exporter.
    Foreign(Arc<dyn BufferExport>),
}

impl core::fmt::Debug for Storage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Owned(_) => write!(f, "Storage::Owned({} bytes)", self.len()),
            Self::Foreign(_) => write!(f, "Storage::Foreign({} bytes)", self.len()),
        }
    }
}

impl Storage {
    pub(crate) fn owned(bytes: Vec<u8>) -> Self {
        Self::Owned(Arc::new(RwLock::new(bytes)))
    }

    pub(crate) fn foreign(exporter: Arc<dyn BufferExport>) -> Self {
        Self::Foreign(exporter)
    }

    pub(crate) fn len(&self) -> usize {
        self.with_bytes(<[u8]>::len)
    }

    pub(crate) fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match self {
            Self::Owned(block) => {
                let guard = block.read().unwrap_or_else(PoisonError::into_inner);
                f(&guard)
            }
            Self::Foreign(exporter) => f(exporter.bytes()),
        }
    }

    /// Mutable access; foreign regions are read-only by contract.
    pub(crate) fn try_with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        match self {
            Self::Owned(block) => {
                let mut guard = block.write().unwrap_or_else(PoisonError::into_inner);
                Ok(f(&mut guard))
            }
            Self::Foreign(_) => Err(Error::TypeMismatch {
                context: "in-place write".to_string(),
                reason: "buffer-imported memory is read-only".to_string(),
            }),
        }
    }

    /// True when both storages alias the same memory.
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Owned(a), Self::Owned(b)) => Arc::ptr_eq(a, b),
            (Self::Foreign(a), Self::Foreign(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn mismatch(ty: &DataType, reason: impl Into<String>) -> Error {
    Error::TypeMismatch {
        context: ty.to_string(),
        reason: reason.into(),
    }
}

// --- encoding ---

/// Binds `value` into a fresh packed block of type `ty`.
pub(crate) fn encode(ty: &DataType, value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(ty, value, &mut out)?;
    Ok(out)
}

fn encode_into(ty: &DataType, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match ty {
        DataType::FixedDim { size, elem } => match value {
            Value::List(items) if items.len() == *size => {
                for item in items {
                    encode_into(elem, item, out)?;
                }
                Ok(())
            }
            Value::List(items) => Err(mismatch(
                ty,
                format!("expected {size} elements, got {}", items.len()),
            )),
            other => Err(mismatch(ty, format!("expected a sequence, got {}", other.kind_name()))),
        },
        DataType::VarDim { elem } => match value {
            Value::List(items) => {
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    encode_into(elem, item, out)?;
                }
                Ok(())
            }
            other => Err(mismatch(ty, format!("expected a sequence, got {}", other.kind_name()))),
        },
        DataType::Record(fields) => match value {
            Value::Record(given) => {
                if given.len() != fields.len() {
                    return Err(mismatch(
                        ty,
                        format!("expected {} fields, got {}", fields.len(), given.len()),
                    ));
                }
                for (name, fty) in fields {
                    let (_, fval) = given
                        .iter()
                        .find(|(n, _)| n == name)
                        .ok_or_else(|| mismatch(ty, format!("missing field '{name}'")))?;
                    encode_into(fty, fval, out)?;
                }
                Ok(())
            }
            other => Err(mismatch(ty, format!("expected a record, got {}", other.kind_name()))),
        },
        DataType::Categorical(levels) => {
            let wanted = match value {
                Value::Str(s) => Some(s.as_str()),
                Value::None => None,
                other => {
                    return Err(mismatch(
                        ty,
                        format!("expected a label or missing marker, got {}", other.kind_name()),
                    ));
                }
            };
            let index = levels
                .iter()
                .position(|l| l.as_deref() == wanted)
                .ok_or_else(|| match wanted {
                    Some(s) => mismatch(ty, format!("'{s}' is not among the levels")),
                    None => mismatch(ty, "the level set has no missing marker"),
                })?;
            out.push(index as u8);
            Ok(())
        }
        DataType::Optional(elem) => {
            if matches!(value, Value::None) {
                out.push(0);
                zero_encode(elem, out)
            } else {
                out.push(1);
                encode_into(elem, value, out)
            }
        }
        DataType::Scalar(kind) => encode_scalar(*kind, value, out).map_err(|reason| mismatch(ty, reason)),
        DataType::SymbolicDim { .. } | DataType::Any => {
            Err(mismatch(ty, "abstract types cannot describe memory"))
        }
    }
}

fn encode_scalar(kind: ScalarKind, value: &Value, out: &mut Vec<u8>) -> std::result::Result<(), String> {
    use ScalarKind as K;
    let fail = |v: &Value| Err(format!("cannot store {} here", v.kind_name()));
    match value {
        Value::Int(i) => {
            let i = *i;
            match kind {
                K::Int8 => push_checked(out, i8::try_from(i).map(i8::to_le_bytes), i),
                K::Int16 => push_checked(out, i16::try_from(i).map(i16::to_le_bytes), i),
                K::Int32 => push_checked(out, i32::try_from(i).map(i32::to_le_bytes), i),
                K::Int64 => {
                    out.extend_from_slice(&i.to_le_bytes());
                    Ok(())
                }
                K::UInt8 => push_checked(out, u8::try_from(i).map(u8::to_le_bytes), i),
                K::UInt16 => push_checked(out, u16::try_from(i).map(u16::to_le_bytes), i),
                K::UInt32 => push_checked(out, u32::try_from(i).map(u32::to_le_bytes), i),
                K::UInt64 => push_checked(out, u64::try_from(i).map(u64::to_le_bytes), i),
                K::Float32 => {
                    out.extend_from_slice(&(i as f32).to_le_bytes());
                    Ok(())
                }
                K::Float64 => {
                    out.extend_from_slice(&(i as f64).to_le_bytes());
                    Ok(())
                }
                K::Bool | K::String => fail(value),
            }
        }
        Value::UInt(u) => {
            let u = *u;
            match kind {
                K::UInt64 => {
                    out.extend_from_slice(&u.to_le_bytes());
                    Ok(())
                }
                K::Float64 => {
                    out.extend_from_slice(&(u as f64).to_le_bytes());
                    Ok(())
                }
                _ => Err(format!("{u} does not fit this element type")),
            }
        }
        Value::Float(x) => match kind {
            K::Float32 => {
                out.extend_from_slice(&(*x as f32).to_le_bytes());
                Ok(())
            }
            K::Float64 => {
                out.extend_from_slice(&x.to_le_bytes());
                Ok(())
            }
            _ => fail(value),
        },
        Value::Bool(b) => match kind {
            K::Bool => {
                out.push(u8::from(*b));
                Ok(())
            }
            _ => fail(value),
        },
        Value::Str(s) => match kind {
            K::String => {
                out.extend_from_slice(&(s.len() as u64).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
                Ok(())
            }
            _ => fail(value),
        },
        Value::None => Err("missing values need an optional or categorical type".to_string()),
        other => fail(other),
    }
}

fn push_checked<T, const N: usize>(
    out: &mut Vec<u8>,
    bytes: std::result::Result<[u8; N], T>,
    shown: i64,
) -> std::result::Result<(), String> {
    match bytes {
        Ok(b) => {
            out.extend_from_slice(&b);
            Ok(())
        }
        Err(_) => Err(format!("{shown} does not fit this element type")),
    }
}

/// Appends the zero value of `ty` (what [`empty`](crate::container::Container::empty)
/// blocks are filled with).
pub(crate) fn zero_encode(ty: &DataType, out: &mut Vec<u8>) -> Result<()> {
    match ty {
        DataType::FixedDim { size, elem } => {
            for _ in 0..*size {
                zero_encode(elem, out)?;
            }
            Ok(())
        }
        DataType::VarDim { .. } => {
            out.extend_from_slice(&0u64.to_le_bytes());
            Ok(())
        }
        DataType::Record(fields) => {
            for (_, fty) in fields {
                zero_encode(fty, out)?;
            }
            Ok(())
        }
        DataType::Categorical(_) => {
            out.push(0);
            Ok(())
        }
        DataType::Optional(elem) => {
            out.push(0);
            zero_encode(elem, out)
        }
        DataType::Scalar(kind) => {
            match kind.size() {
                Some(n) => out.extend(std::iter::repeat_n(0u8, n)),
                // Zero-length string.
                None => out.extend_from_slice(&0u64.to_le_bytes()),
            }
            Ok(())
        }
        DataType::SymbolicDim { .. } | DataType::Any => {
            Err(mismatch(ty, "abstract types cannot describe memory"))
        }
    }
}

// --- decoding ---

/// Reads the value stored in `bytes` back out as a host [`Value`].
pub(crate) fn decode(ty: &DataType, bytes: &[u8]) -> Result<Value> {
    let mut pos = 0;
    decode_at(ty, bytes, &mut pos)
}

fn take<'a>(ty: &DataType, bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(n).filter(|&e| e <= bytes.len());
    match end {
        Some(end) => {
            let slice = &bytes[*pos..end];
            *pos = end;
            Ok(slice)
        }
        None => Err(mismatch(ty, "memory block is too small for this type")),
    }
}

fn read_u64(ty: &DataType, bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let raw = take(ty, bytes, pos, 8)?;
    Ok(u64::from_le_bytes(raw.try_into().unwrap()))
}

fn decode_at(ty: &DataType, bytes: &[u8], pos: &mut usize) -> Result<Value> {
    match ty {
        DataType::FixedDim { size, elem } => {
            let mut items = Vec::with_capacity(*size);
            for _ in 0..*size {
                items.push(decode_at(elem, bytes, pos)?);
            }
            Ok(Value::List(items))
        }
        DataType::VarDim { elem } => {
            let count = read_u64(ty, bytes, pos)? as usize;
            let floor = min_encoded_size(elem);
            if floor > 0 && count.saturating_mul(floor) > bytes.len() - *pos {
                return Err(mismatch(ty, "memory block is too small for this type"));
            }
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_at(elem, bytes, pos)?);
            }
            Ok(Value::List(items))
        }
        DataType::Record(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for (name, fty) in fields {
                out.push((name.clone(), decode_at(fty, bytes, pos)?));
            }
            Ok(Value::Record(out))
        }
        DataType::Categorical(levels) => {
            let index = take(ty, bytes, pos, 1)?[0] as usize;
            match levels.get(index) {
                Some(Some(label)) => Ok(Value::Str(label.clone())),
                Some(None) => Ok(Value::None),
                None => Err(mismatch(ty, format!("level index {index} out of range"))),
            }
        }
        DataType::Optional(elem) => {
            let tag = take(ty, bytes, pos, 1)?[0];
            if tag == 0 {
                skip(elem, bytes, pos)?;
                Ok(Value::None)
            } else {
                decode_at(elem, bytes, pos)
            }
        }
        DataType::Scalar(kind) => decode_scalar(ty, *kind, bytes, pos),
        DataType::SymbolicDim { .. } | DataType::Any => {
            Err(mismatch(ty, "abstract types cannot describe memory"))
        }
    }
}

fn decode_scalar(ty: &DataType, kind: ScalarKind, bytes: &[u8], pos: &mut usize) -> Result<Value> {
    use ScalarKind as K;
    macro_rules! fixed {
        ($t:ty, $n:expr, $wrap:expr) => {{
            let raw = take(ty, bytes, pos, $n)?;
            let v = <$t>::from_le_bytes(raw.try_into().unwrap());
            Ok($wrap(v))
        }};
    }
    match kind {
        K::Bool => {
            let raw = take(ty, bytes, pos, 1)?[0];
            match raw {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                _ => Err(mismatch(ty, "invalid boolean byte")),
            }
        }
        K::Int8 => fixed!(i8, 1, |v| Value::Int(i64::from(v))),
        K::Int16 => fixed!(i16, 2, |v| Value::Int(i64::from(v))),
        K::Int32 => fixed!(i32, 4, |v| Value::Int(i64::from(v))),
        K::Int64 => fixed!(i64, 8, Value::Int),
        K::UInt8 => fixed!(u8, 1, |v| Value::Int(i64::from(v))),
        K::UInt16 => fixed!(u16, 2, |v| Value::Int(i64::from(v))),
        K::UInt32 => fixed!(u32, 4, |v| Value::Int(i64::from(v))),
        K::UInt64 => fixed!(u64, 8, Value::from),
        K::Float32 => fixed!(f32, 4, |v| Value::Float(f64::from(v))),
        K::Float64 => fixed!(f64, 8, Value::Float),
        K::String => {
            let len = read_u64(ty, bytes, pos)? as usize;
            let raw = take(ty, bytes, pos, len)?;
            let s = core::str::from_utf8(raw)
                .map_err(|_| mismatch(ty, "string bytes are not valid UTF-8"))?;
            Ok(Value::Str(s.to_string()))
        }
    }
}

fn skip(ty: &DataType, bytes: &[u8], pos: &mut usize) -> Result<()> {
    match ty {
        DataType::FixedDim { size, elem } => {
            for _ in 0..*size {
                skip(elem, bytes, pos)?;
            }
            Ok(())
        }
        DataType::VarDim { elem } => {
            let count = read_u64(ty, bytes, pos)? as usize;
            for _ in 0..count {
                skip(elem, bytes, pos)?;
            }
            Ok(())
        }
        DataType::Record(fields) => {
            for (_, fty) in fields {
                skip(fty, bytes, pos)?;
            }
            Ok(())
        }
        DataType::Categorical(_) => take(ty, bytes, pos, 1).map(|_| ()),
        DataType::Optional(elem) => {
            take(ty, bytes, pos, 1)?;
            skip(elem, bytes, pos)
        }
        DataType::Scalar(kind) => match kind.size() {
            Some(n) => take(ty, bytes, pos, n).map(|_| ()),
            None => {
                let len = read_u64(ty, bytes, pos)? as usize;
                take(ty, bytes, pos, len).map(|_| ())
            }
        },
        DataType::SymbolicDim { .. } | DataType::Any => {
            Err(mismatch(ty, "abstract types cannot describe memory"))
        }
    }
}

/// Smallest possible encoded size of a value of `ty`; guards ragged decode
/// against nonsense counts from unchecked buffer imports.
fn min_encoded_size(ty: &DataType) -> usize {
    match ty {
        DataType::FixedDim { size, elem } => size * min_encoded_size(elem),
        DataType::VarDim { .. } => 8,
        DataType::Record(fields) => fields.iter().map(|(_, t)| min_encoded_size(t)).sum(),
        DataType::Categorical(_) => 1,
        DataType::Optional(elem) => 1 + min_encoded_size(elem),
        DataType::Scalar(kind) => kind.size().unwrap_or(8),
        DataType::SymbolicDim { .. } | DataType::Any => 0,
    }
}

// --- element lanes for the kernel modules ---

/// Reads a packed numeric block as `f64` lanes.
pub(crate) fn f64_lanes(kind: ScalarKind, bytes: &[u8]) -> Result<Vec<f64>> {
    use ScalarKind as K;
    macro_rules! lanes {
        ($t:ty, $n:expr, $map:expr) => {
            Ok(bytes
                .chunks_exact($n)
                .map(|c| {
                    let v = <$t>::from_le_bytes(c.try_into().unwrap());
                    ($map)(v)
                })
                .collect())
        };
    }
    match kind {
        K::Int8 => lanes!(i8, 1, f64::from),
        K::Int16 => lanes!(i16, 2, f64::from),
        K::Int32 => lanes!(i32, 4, f64::from),
        K::Int64 => lanes!(i64, 8, |v| v as f64),
        K::UInt8 => lanes!(u8, 1, f64::from),
        K::UInt16 => lanes!(u16, 2, f64::from),
        K::UInt32 => lanes!(u32, 4, f64::from),
        K::UInt64 => lanes!(u64, 8, |v| v as f64),
        K::Float32 => lanes!(f32, 4, f64::from),
        K::Float64 => lanes!(f64, 8, |v| v),
        K::Bool | K::String => Err(Error::TypeMismatch {
            context: kind.name().to_string(),
            reason: "not a numeric element type".to_string(),
        }),
    }
}

/// Reads a packed integer block as `i64` lanes (bit-preserving for
/// `uint64`).
pub(crate) fn i64_lanes(kind: ScalarKind, bytes: &[u8]) -> Result<Vec<i64>> {
    use ScalarKind as K;
    macro_rules! lanes {
        ($t:ty, $n:expr, $map:expr) => {
            Ok(bytes
                .chunks_exact($n)
                .map(|c| {
                    let v = <$t>::from_le_bytes(c.try_into().unwrap());
                    ($map)(v)
                })
                .collect())
        };
    }
    match kind {
        K::Int8 => lanes!(i8, 1, i64::from),
        K::Int16 => lanes!(i16, 2, i64::from),
        K::Int32 => lanes!(i32, 4, i64::from),
        K::Int64 => lanes!(i64, 8, |v| v),
        K::UInt8 => lanes!(u8, 1, i64::from),
        K::UInt16 => lanes!(u16, 2, i64::from),
        K::UInt32 => lanes!(u32, 4, i64::from),
        K::UInt64 => lanes!(u64, 8, |v| v as i64),
        _ => Err(Error::TypeMismatch {
            context: kind.name().to_string(),
            reason: "not an integer element type".to_string(),
        }),
    }
}

/// Reads a packed boolean block.
pub(crate) fn bool_lanes(bytes: &[u8]) -> Result<Vec<bool>> {
    bytes
        .iter()
        .map(|&b| match b {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(Error::TypeMismatch {
                context: "bool".to_string(),
                reason: "invalid boolean byte".to_string(),
            }),
        })
        .collect()
}

/// Packs `f64` lanes into a float block of the given kind.
pub(crate) fn pack_f64(kind: ScalarKind, lanes: &[f64]) -> Result<Vec<u8>> {
    match kind {
        ScalarKind::Float32 => Ok(lanes.iter().flat_map(|&v| (v as f32).to_le_bytes()).collect()),
        ScalarKind::Float64 => Ok(lanes.iter().flat_map(|&v| v.to_le_bytes()).collect()),
        _ => Err(Error::TypeMismatch {
            context: kind.name().to_string(),
            reason: "float lanes require a float element type".to_string(),
        }),
    }
}

/// Packs `i64` lanes into an integer block, wrapping at the element width.
pub(crate) fn pack_i64(kind: ScalarKind, lanes: &[i64]) -> Result<Vec<u8>> {
    use ScalarKind as K;
    macro_rules! pack {
        ($t:ty) => {
            Ok(lanes.iter().flat_map(|&v| (v as $t).to_le_bytes()).collect())
        };
    }
    match kind {
        K::Int8 => pack!(i8),
        K::Int16 => pack!(i16),
        K::Int32 => pack!(i32),
        K::Int64 => pack!(i64),
        K::UInt8 => pack!(u8),
        K::UInt16 => pack!(u16),
        K::UInt32 => pack!(u32),
        K::UInt64 => pack!(u64),
        _ => Err(Error::TypeMismatch {
            context: kind.name().to_string(),
            reason: "integer lanes require an integer element type".to_string(),
        }),
    }
}

/// Packs boolean lanes into a block.
pub(crate) fn pack_bool(lanes: &[bool]) -> Vec<u8> {
    lanes.iter().map(|&b| u8::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(type_str: &str, value: Value) {
        let ty = DataType::parse(type_str).unwrap();
        let bytes = encode(&ty, &value).unwrap();
        assert_eq!(decode(&ty, &bytes).unwrap(), value, "{type_str}");
    }

    #[test]
    fn scalar_blocks_round_trip() {
        round_trip("int64", Value::Int(-7));
        round_trip("uint8", Value::Int(200));
        round_trip("float64", Value::Float(2.5));
        round_trip("bool", Value::Bool(true));
        round_trip("string", Value::Str("xyz".to_string()));
    }

    #[test]
    fn ragged_blocks_round_trip() {
        round_trip(
            "var * var * int64",
            Value::from(vec![vec![1i64, 2, 3], vec![4]]),
        );
    }

    #[test]
    fn records_and_optionals_round_trip() {
        round_trip(
            "{a : string, b : 3 * int64}",
            Value::record([("a", Value::from("xyz")), ("b", Value::from(vec![1, 2, 3]))]),
        );
        round_trip(
            "3 * ?int64",
            Value::List(vec![Value::Int(1), Value::None, Value::Int(3)]),
        );
    }

    #[test]
    fn categorical_blocks_round_trip() {
        round_trip(
            "4 * categorical('a', 'b', NA)",
            Value::List(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string()),
                Value::None,
                Value::Str("a".to_string()),
            ]),
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let ty = DataType::parse("uint8").unwrap();
        assert!(encode(&ty, &Value::Int(256)).is_err());
        assert!(encode(&ty, &Value::Int(-1)).is_err());
    }

    #[test]
    fn truncated_blocks_are_rejected() {
        let ty = DataType::parse("3 * int64").unwrap();
        assert!(decode(&ty, &[0u8; 8]).is_err());
    }
}

//! The typed container.
//!
//! [`Container`] unboxes a host [`Value`] into a typed memory block. The
//! concrete type is resolved at construction from the value and at most one
//! construction hint; the block then lives on an optional device.
//!
//! Construction paths:
//!
//! - [`Container::new`] — bind a value, resolving its type (§ hints below)
//! - [`Container::empty`] — zero-initialized block of a given type
//! - [`Container::from_buffer_unchecked`] — zero-copy import of external
//!   memory with a caller-supplied type and **no validation**
//! - [`Container::from_buffer`] — the same import with an opt-in size check
//!
//! # Hints
//!
//! Exactly one of `type`, `dtype`, `levels`, `typedef`, `dtypedef` may be
//! given; supplying more than one fails with
//! [`Error::ConflictingHints`](crate::error::Error::ConflictingHints).
//! Supplying none runs full structural and value type inference.
//!
//! Views returned by [`reshape`](Container::reshape) share the underlying
//! block: mutation through one view is visible to every sharer. Copies are
//! explicit via [`copy_contiguous`](Container::copy_contiguous).

use core::fmt;
use std::sync::Arc;

use briny::prelude::*;

use crate::bridge::BufferExport;
use crate::device::DeviceSpec;
use crate::error::{Error, Result};
use crate::infer::infer;
use crate::mem::{self, Storage};
use crate::types::{self, DataType, ScalarKind};
use crate::value::Value;

/// A type given either as a literal string or as an already-parsed
/// descriptor.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    /// A type string, parsed on use.
    Literal(String),
    /// A parsed descriptor, used as-is.
    Descriptor(DataType),
}

impl TypeSpec {
    fn resolve(&self) -> Result<DataType> {
        match self {
            Self::Literal(s) => DataType::parse(s),
            Self::Descriptor(t) => Ok(t.clone()),
        }
    }
}

impl From<&str> for TypeSpec {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for TypeSpec {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

impl From<DataType> for TypeSpec {
    fn from(t: DataType) -> Self {
        Self::Descriptor(t)
    }
}

/// Mutually exclusive construction hints.
///
/// # Example
/// ```
/// use ragbox::container::{Container, TypeHints};
/// use ragbox::value::Value;
///
/// let v = Value::from(vec!["a", "b"]);
/// let hints = TypeHints::with_levels([Some("a"), Some("b"), None]);
/// let c = Container::new(&v, hints, None).unwrap();
/// assert_eq!(c.ty().to_string(), "2 * categorical('a', 'b', NA)");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeHints {
    /// Explicit type; the value must conform to it.
    pub ty: Option<TypeSpec>,
    /// Element type; the shape is inferred around it.
    pub dtype: Option<TypeSpec>,
    /// Ordered category labels; `None` is the missing marker.
    pub levels: Option<Vec<Option<String>>>,
    /// Type template; abstract templates are instantiated against the value.
    pub typedef: Option<TypeSpec>,
    /// Element-type template used for inference.
    pub dtypedef: Option<TypeSpec>,
}

impl TypeHints {
    /// No hints: full type inference.
    pub fn none() -> Self {
        Self::default()
    }

    /// Explicit type hint.
    pub fn with_type(ty: impl Into<TypeSpec>) -> Self {
        Self {
            ty: Some(ty.into()),
            ..Self::default()
        }
    }

    /// Element-type hint.
    pub fn with_dtype(dtype: impl Into<TypeSpec>) -> Self {
        Self {
            dtype: Some(dtype.into()),
            ..Self::default()
        }
    }

    /// Categorical level-set hint.
    pub fn with_levels<S: Into<String>>(levels: impl IntoIterator<Item = Option<S>>) -> Self {
        Self {
            levels: Some(levels.into_iter().map(|l| l.map(Into::into)).collect()),
            ..Self::default()
        }
    }

    /// Type-template hint.
    pub fn with_typedef(typedef: impl Into<TypeSpec>) -> Self {
        Self {
            typedef: Some(typedef.into()),
            ..Self::default()
        }
    }

    /// Element-type-template hint.
    pub fn with_dtypedef(dtypedef: impl Into<TypeSpec>) -> Self {
        Self {
            dtypedef: Some(dtypedef.into()),
            ..Self::default()
        }
    }
}

/// Resolves the concrete type for `value` under `hints`.
pub fn resolve_type(value: &Value, hints: &TypeHints) -> Result<DataType> {
    let mut given: Vec<&'static str> = Vec::new();
    if hints.ty.is_some() {
        given.push("type");
    }
    if hints.dtype.is_some() {
        given.push("dtype");
    }
    if hints.levels.is_some() {
        given.push("levels");
    }
    if hints.typedef.is_some() {
        given.push("typedef");
    }
    if hints.dtypedef.is_some() {
        given.push("dtypedef");
    }
    if given.len() > 1 {
        return Err(Error::ConflictingHints { given });
    }

    if let Some(spec) = &hints.ty {
        spec.resolve()
    } else if let Some(spec) = &hints.dtype {
        let dtype = spec.resolve()?;
        infer(value, Some(&dtype), true)
    } else if let Some(levels) = &hints.levels {
        let len = value.len().ok_or_else(|| Error::TypeMismatch {
            context: "levels".to_string(),
            reason: format!(
                "categorical construction expects a sequence value, got {}",
                value.kind_name()
            ),
        })?;
        let args = levels
            .iter()
            .map(|l| match l {
                Some(label) => format!("'{label}'"),
                None => "NA".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        DataType::parse(&format!("{len} * categorical({args})"))
    } else if let Some(spec) = &hints.typedef {
        let template = spec.resolve()?;
        if template.is_abstract() {
            let hidden = template.hidden_dtype();
            let hint = match hidden {
                DataType::Any => None,
                ref t => Some(t),
            };
            let concrete = infer(value, hint, true)?;
            types::instantiate(&template, &concrete)
        } else {
            Ok(template)
        }
    } else if let Some(spec) = &hints.dtypedef {
        let dtype = spec.resolve()?;
        infer(value, Some(&dtype), true)
    } else {
        infer(value, None, true)
    }
}

/// Row-major / column-major choice for [`Container::reshape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryOrder {
    /// C order; reshaping is a zero-copy reinterpretation.
    #[default]
    RowMajor,
    /// Fortran order; reshaping copies.
    ColMajor,
}

/// A typed memory block with an optional device.
///
/// Cloning a container is cheap and yields another view of the same block.
#[derive(Debug, Clone)]
pub struct Container {
    ty: DataType,
    storage: Storage,
    device: Option<DeviceSpec>,
}

impl Container {
    /// Binds `value` into typed memory, resolving its type from `hints` and
    /// normalizing `device` (`"<name>:<index>"`, `managed` for unified
    /// memory).
    ///
    /// # Example
    /// ```
    /// use ragbox::container::{Container, TypeHints};
    /// use ragbox::value::Value;
    ///
    /// let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
    /// let c = Container::new(&v, TypeHints::none(), None).unwrap();
    /// assert_eq!(c.ty().to_string(), "2 * 3 * int64");
    /// ```
    pub fn new(value: &Value, hints: TypeHints, device: Option<&str>) -> Result<Self> {
        let ty = resolve_type(value, &hints)?;
        let device = device.map(DeviceSpec::parse).transpose()?;
        let bytes = mem::encode(&ty, value)?;
        Ok(Self {
            ty,
            storage: Storage::owned(bytes),
            device,
        })
    }

    /// Allocates a zero-initialized block of `ty` without inspecting any
    /// value.
    ///
    /// Fails for ragged types, whose size depends on the data.
    pub fn empty(ty: impl Into<TypeSpec>, device: Option<&str>) -> Result<Self> {
        let ty = ty.into().resolve()?;
        let device = device.map(DeviceSpec::parse).transpose()?;
        if find_var(&ty).is_some() {
            return Err(Error::TypeMismatch {
                context: ty.to_string(),
                reason: "cannot allocate a ragged type without a value".to_string(),
            });
        }
        let mut bytes = Vec::new();
        mem::zero_encode(&ty, &mut bytes)?;
        Ok(Self {
            ty,
            storage: Storage::owned(bytes),
            device,
        })
    }

    /// Binds to memory exported by `exporter`, overriding the type the
    /// export convention would have implied with the caller-supplied `ty`.
    ///
    /// No layout or size validation is performed; this is the single
    /// unchecked escape hatch. If `ty`'s byte layout does not match the
    /// exported region, reads produce garbage or fail. The exporter's memory
    /// is never written or freed.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use ragbox::container::Container;
    /// use ragbox::value::Value;
    ///
    /// let c = Container::from_buffer_unchecked(Arc::new(*b"123"), "3 * uint8").unwrap();
    /// assert_eq!(c.value().unwrap(), Value::from(vec![49, 50, 51]));
    /// ```
    pub fn from_buffer_unchecked(
        exporter: Arc<dyn BufferExport>,
        ty: impl Into<TypeSpec>,
    ) -> Result<Self> {
        let ty = ty.into().resolve()?;
        Ok(Self {
            ty,
            storage: Storage::foreign(exporter),
            device: None,
        })
    }

    /// Like [`from_buffer_unchecked`](Self::from_buffer_unchecked), but
    /// first checks that the exported byte length matches the type's packed
    /// size. Only types with a static size can be validated.
    pub fn from_buffer(exporter: Arc<dyn BufferExport>, ty: impl Into<TypeSpec>) -> Result<Self> {
        let ty = ty.into().resolve()?;
        let expected = ty.datasize()?;
        let got = exporter.bytes().len();
        BufferFit { expected, got }
            .validate()
            .map_err(|_| Error::BufferValidation {
                type_str: ty.to_string(),
                expected,
                got,
            })?;
        Ok(Self {
            ty,
            storage: Storage::foreign(exporter),
            device: None,
        })
    }

    /// The container's type descriptor.
    pub fn ty(&self) -> &DataType {
        &self.ty
    }

    /// The container's device, if one was given at construction.
    pub fn device(&self) -> Option<&DeviceSpec> {
        self.device.as_ref()
    }

    /// The fixed shape of the leading dimensions.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.ty.shape()
    }

    /// Row-major byte strides matching [`shape`](Self::shape).
    pub fn strides(&self) -> Result<Vec<usize>> {
        self.ty.strides()
    }

    /// Reads the stored value back out.
    pub fn value(&self) -> Result<Value> {
        self.storage.with_bytes(|b| mem::decode(&self.ty, b))
    }

    /// Returns a densely packed copy, optionally cast to `dtype`.
    pub fn copy_contiguous(&self, dtype: Option<&str>) -> Result<Self> {
        let ty = match dtype {
            Some(s) => types::replace_dtype(&self.ty, &DataType::parse(s)?)?,
            None => self.ty.clone(),
        };
        let value = self.value()?;
        let bytes = mem::encode(&ty, &value)?;
        Ok(Self {
            ty,
            storage: Storage::owned(bytes),
            device: self.device.clone(),
        })
    }

    /// Reinterprets the block with new dimensions.
    ///
    /// Row-major reshapes are zero-copy views sharing this block; the
    /// column-major order copies. The element count must be preserved, and
    /// the element type must have a fixed size.
    pub fn reshape(&self, dims: &[usize], order: Option<MemoryOrder>) -> Result<Self> {
        let shape = self.ty.shape()?;
        let dtype = self.ty.dtype().clone();
        let elem_size = dtype.datasize()?;
        let n_old: usize = shape.iter().product();
        let n_new: usize = dims.iter().product();
        if n_old != n_new {
            return Err(Error::TypeMismatch {
                context: self.ty.to_string(),
                reason: format!(
                    "cannot reshape {n_old} elements into {n_new} ({dims:?})"
                ),
            });
        }
        let ty = dims.iter().rev().fold(dtype, |elem, &size| DataType::FixedDim {
            size,
            elem: Box::new(elem),
        });
        match order.unwrap_or_default() {
            MemoryOrder::RowMajor => Ok(Self {
                ty,
                storage: self.storage.clone(),
                device: self.device.clone(),
            }),
            MemoryOrder::ColMajor => {
                let bytes = self.storage.with_bytes(|src| {
                    let mut dst = vec![0u8; src.len()];
                    for k in 0..n_old {
                        let from = fortran_to_c_offset(k, &shape) * elem_size;
                        let to = fortran_to_c_offset(k, dims) * elem_size;
                        dst[to..to + elem_size].copy_from_slice(&src[from..from + elem_size]);
                    }
                    dst
                });
                Ok(Self {
                    ty,
                    storage: Storage::owned(bytes),
                    device: self.device.clone(),
                })
            }
        }
    }

    /// True when both containers are views of the same memory block.
    pub fn memory_eq(&self, other: &Self) -> bool {
        self.storage.ptr_eq(&other.storage)
    }

    // --- crate-internal plumbing for the kernel modules and the bridge ---

    pub(crate) fn from_parts(ty: DataType, storage: Storage, device: Option<DeviceSpec>) -> Self {
        Self { ty, storage, device }
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.storage
    }

    /// The scalar element kind; kernels only accept plain scalar elements.
    pub(crate) fn elem_kind(&self) -> Result<ScalarKind> {
        self.ty.scalar_kind().ok_or_else(|| Error::TypeMismatch {
            context: self.ty.to_string(),
            reason: "elementwise kernels require a scalar element type".to_string(),
        })
    }

    pub(crate) fn f64_lanes(&self) -> Result<Vec<f64>> {
        let kind = self.elem_kind()?;
        self.shape()?;
        self.storage.with_bytes(|b| mem::f64_lanes(kind, b))
    }

    pub(crate) fn i64_lanes(&self) -> Result<Vec<i64>> {
        let kind = self.elem_kind()?;
        self.shape()?;
        self.storage.with_bytes(|b| mem::i64_lanes(kind, b))
    }

    pub(crate) fn bool_lanes(&self) -> Result<Vec<bool>> {
        let kind = self.elem_kind()?;
        if kind != ScalarKind::Bool {
            return Err(Error::TypeMismatch {
                context: self.ty.to_string(),
                reason: "expected a boolean element type".to_string(),
            });
        }
        self.shape()?;
        self.storage.with_bytes(mem::bool_lanes)
    }

    /// Overwrites this container's block with `bytes` (same length).
    pub(crate) fn write_block(&self, bytes: &[u8]) -> Result<()> {
        let len = self.storage.len();
        if bytes.len() != len {
            return Err(Error::TypeMismatch {
                context: self.ty.to_string(),
                reason: format!("result block is {} bytes, destination is {len}", bytes.len()),
            });
        }
        self.storage.try_with_bytes_mut(|dst| dst.copy_from_slice(bytes))
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container(")?;
        match self.value() {
            Ok(v) => fmt_bounded(&v, f, 10)?,
            Err(_) => write!(f, "<unreadable>")?,
        }
        write!(f, ", type=\"{}\")", self.ty)
    }
}

/// Pretty-prints `v` showing at most `limit` elements per dimension.
pub(crate) fn fmt_bounded(v: &Value, f: &mut fmt::Formatter<'_>, limit: usize) -> fmt::Result {
    match v {
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().take(limit).enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                fmt_bounded(item, f, limit)?;
            }
            if items.len() > limit {
                write!(f, ", ...")?;
            }
            write!(f, "]")
        }
        Value::Record(fields) => {
            write!(f, "{{")?;
            for (i, (name, value)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{name}: ")?;
                fmt_bounded(value, f, limit)?;
            }
            write!(f, "}}")
        }
        other => write!(f, "{other}"),
    }
}

/// Fortran-order linear index `k` in `shape`, as a C-order element offset.
fn fortran_to_c_offset(k: usize, shape: &[usize]) -> usize {
    let mut c_strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        c_strides[i] = c_strides[i + 1] * shape[i + 1].max(1);
    }
    let mut rem = k;
    let mut offset = 0;
    for (i, &dim) in shape.iter().enumerate() {
        let coord = rem % dim.max(1);
        rem /= dim.max(1);
        offset += coord * c_strides[i];
    }
    offset
}

fn find_var(ty: &DataType) -> Option<()> {
    match ty {
        DataType::VarDim { .. } => Some(()),
        DataType::FixedDim { elem, .. } | DataType::Optional(elem) => find_var(elem),
        DataType::Record(fields) => fields.iter().find_map(|(_, t)| find_var(t)),
        _ => None,
    }
}

/// Size check for the validated buffer import.
struct BufferFit {
    expected: usize,
    got: usize,
}

impl Validate for BufferFit {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.expected == self.got {
            Ok(())
        } else {
            Err(ValidationError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_exclusivity() {
        let v = Value::from(vec![1, 2, 3]);
        let hints = TypeHints {
            ty: Some("3 * int64".into()),
            dtype: Some("int64".into()),
            ..TypeHints::default()
        };
        match Container::new(&v, hints, None) {
            Err(Error::ConflictingHints { given }) => {
                assert_eq!(given, vec!["type", "dtype"]);
            }
            other => panic!("expected ConflictingHints, got {other:?}"),
        }
    }

    #[test]
    fn fortran_reshape_transposes() {
        let v = Value::from(vec![vec![1, 2, 3], vec![4, 5, 6]]);
        let c = Container::new(&v, TypeHints::none(), None).unwrap();
        let r = c.reshape(&[3, 2], Some(MemoryOrder::ColMajor)).unwrap();
        // Fortran read order of [[1,2,3],[4,5,6]] is 1,4,2,5,3,6; written in
        // Fortran order into a 3 x 2 block that is [[1,5],[4,3],[2,6]].
        assert_eq!(
            r.value().unwrap(),
            Value::from(vec![vec![1i64, 5], vec![4, 3], vec![2, 6]])
        );
    }
}

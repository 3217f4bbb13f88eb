//! Universal-function bridge to a foreign array engine.
//!
//! This is the sole interop seam with a foreign array-computation library.
//! Arrays cross the boundary as zero-copy views over their memory blocks;
//! foreign results come back as exported buffers and are wrapped into
//! arrays without copying.
//!
//! The exchange contract of [`handle_ufunc`]:
//!
//! - every input (and every output, when `out` is given) must be an
//!   [`Array`] operand; anything else fails with
//!   [`Error::OperandType`] naming the offending operand's kind
//! - without `out`, the foreign result(s) are wrapped back into arrays via
//!   unchecked zero-copy buffer import (a tuple of results wraps each
//!   element independently)
//! - with `out`, the foreign engine writes through the shared blocks and
//!   `out` is returned unchanged

use std::sync::Arc;

use crate::array::Array;
use crate::error::{Error, Result};
use crate::mem::Storage;
use crate::value::Value;

/// The buffer-export convention: any object exposing a byte-addressable
/// memory region for zero-copy import.
///
/// The importer never writes or frees the exported region.
pub trait BufferExport: Send + Sync {
    /// The exported bytes.
    fn bytes(&self) -> &[u8];
}

impl BufferExport for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl<const N: usize> BufferExport for [u8; N] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

impl BufferExport for &'static [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }
}

/// An array crossing into the foreign engine: a zero-copy view of its block
/// plus its type string.
pub struct ForeignView {
    storage: Storage,
    ty: String,
}

impl ForeignView {
    /// The view's type string.
    pub fn type_str(&self) -> &str {
        &self.ty
    }

    /// Number of bytes in the viewed block.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// True when the viewed block is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read access to the shared block.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.storage.with_bytes(f)
    }

    /// Write access to the shared block (how an engine honors `out`).
    /// Fails for read-only buffer-imported memory.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        self.storage.try_with_bytes_mut(f)
    }
}

/// One array produced by the foreign engine: an exported buffer plus the
/// type it should be read as.
pub struct ForeignResult {
    /// The exported memory, imported zero-copy.
    pub data: Arc<dyn BufferExport>,
    /// The result's type string.
    pub ty: String,
}

/// What a foreign dispatch produced.
pub enum ForeignOutput {
    /// One result array.
    Single(ForeignResult),
    /// A tuple of result arrays, wrapped independently.
    Tuple(Vec<ForeignResult>),
}

/// The foreign engine's dispatch methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UfuncMethod {
    /// Plain elementwise application.
    Call,
    /// Reduction along an axis.
    Reduce,
    /// Cumulative application.
    Accumulate,
    /// Outer product application.
    Outer,
    /// Indexed in-place application.
    At,
}

/// An operand handed to [`handle_ufunc`]. Only the `Array` variant is
/// accepted; the others exist so callers can pass through whatever they
/// were given and get a diagnosable error back.
pub enum UfuncArg {
    /// An array operand.
    Array(Array),
    /// A raw host value; rejected with its kind named.
    Value(Value),
}

impl UfuncArg {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Value(v) => v.kind_name(),
        }
    }
}

impl From<Array> for UfuncArg {
    fn from(a: Array) -> Self {
        Self::Array(a)
    }
}

impl From<Value> for UfuncArg {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

/// A foreign array engine's multi-dispatch entry point.
pub trait UfuncEngine {
    /// Executes `op` with `method` over the given input views, writing into
    /// `out` views when supplied, otherwise returning fresh results.
    fn apply(
        &self,
        op: &str,
        method: UfuncMethod,
        inputs: &[ForeignView],
        out: Option<&[ForeignView]>,
    ) -> Result<ForeignOutput>;
}

fn as_views(args: &[UfuncArg]) -> Result<Vec<ForeignView>> {
    args.iter()
        .map(|arg| match arg {
            UfuncArg::Array(a) => Ok(ForeignView {
                storage: a.container().storage().clone(),
                ty: a.ty().to_string(),
            }),
            other => Err(Error::OperandType {
                expected: "arrays",
                found: other.kind_name().to_string(),
            }),
        })
        .collect()
}

fn wrap(result: ForeignResult) -> Result<Array> {
    Array::from_buffer_unchecked(result.data, result.ty.as_str())
}

/// Runs one universal-function exchange with a foreign engine.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use ragbox::array::Array;
/// use ragbox::bridge::{
///     handle_ufunc, ForeignOutput, ForeignResult, ForeignView, UfuncArg, UfuncEngine,
///     UfuncMethod,
/// };
/// use ragbox::container::TypeHints;
/// use ragbox::error::Result;
/// use ragbox::value::Value;
///
/// /// An engine whose only op is an elementwise copy.
/// struct CopyEngine;
///
/// impl UfuncEngine for CopyEngine {
///     fn apply(
///         &self,
///         _op: &str,
///         _method: UfuncMethod,
///         inputs: &[ForeignView],
///         _out: Option<&[ForeignView]>,
///     ) -> Result<ForeignOutput> {
///         let view = &inputs[0];
///         Ok(ForeignOutput::Single(ForeignResult {
///             data: Arc::new(view.with_bytes(|b| b.to_vec())),
///             ty: view.type_str().to_string(),
///         }))
///     }
/// }
///
/// let a = Array::new(&Value::from(vec![1, 2, 3]), TypeHints::none(), None).unwrap();
/// let out = handle_ufunc(&CopyEngine, "copy", UfuncMethod::Call, &[a.into()], None).unwrap();
/// assert_eq!(out[0].to_value().unwrap(), Value::from(vec![1, 2, 3]));
/// ```
pub fn handle_ufunc(
    engine: &dyn UfuncEngine,
    op: &str,
    method: UfuncMethod,
    inputs: &[UfuncArg],
    out: Option<&[UfuncArg]>,
) -> Result<Vec<Array>> {
    if inputs.is_empty() {
        return Err(Error::OperandType {
            expected: "arrays",
            found: "an empty input list".to_string(),
        });
    }
    let input_views = as_views(inputs)?;

    match out {
        None => match engine.apply(op, method, &input_views, None)? {
            ForeignOutput::Single(result) => Ok(vec![wrap(result)?]),
            ForeignOutput::Tuple(results) => results.into_iter().map(wrap).collect(),
        },
        Some(outs) => {
            let out_views = as_views(outs)?;
            engine.apply(op, method, &input_views, Some(&out_views))?;
            // The engine wrote through the shared blocks; hand back the
            // same arrays.
            Ok(outs
                .iter()
                .map(|arg| match arg {
                    UfuncArg::Array(a) => a.clone(),
                    UfuncArg::Value(_) => unreachable!("validated above"),
                })
                .collect())
        }
    }
}

//! Managed-GPU kernel set.
//!
//! Serves operands that all live on the managed-GPU device
//! (`cuda:managed`). Managed memory is host-visible by definition, so this
//! set can always complete an operation: with the `wgpu` feature enabled it
//! first attempts the GPU compute path for float binary arithmetic and
//! falls back to the host loops of the general set on any GPU failure;
//! without the feature it computes on the managed block directly.

use crate::container::Container;
use crate::error::Result;
use crate::ops::{BinaryKind, UnaryKind};

/// Runs one unary kernel on managed operands.
pub(crate) fn unary(op: UnaryKind, x: &Container, out: Option<&Container>) -> Result<Container> {
    super::cpu::unary(op, x, out)
}

/// Runs one binary kernel on managed operands.
pub(crate) fn binary(
    op: BinaryKind,
    a: &Container,
    b: &Container,
    out: Option<&Container>,
) -> Result<Container> {
    #[cfg(any(feature = "wgpu", feature = "cuda"))]
    if let Some(lanes) = super::wgpu::try_float_binary(op, a, b) {
        return super::cpu::deliver_float_binary(op, a, lanes, out);
    }

    super::cpu::binary(op, a, b, out)
}

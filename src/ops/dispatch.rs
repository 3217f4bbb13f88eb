//! Kernel-set selection by operand devices.
//!
//! [`select`] implements the routing law of the array operator protocol:
//! the managed-GPU set serves an operation iff *every* operand device is
//! the managed-GPU device; every other combination — absent devices,
//! indexed devices, mixed devices — goes to the general set, which
//! reconciles host-visible blocks without moving data.
//!
//! Both kernel sets are process-wide state, lazily initialized at most once
//! behind `lazy_static` and shared by every array for the lifetime of the
//! process.

use crate::container::Container;
use crate::device::DeviceSpec;
use crate::error::Result;
use crate::ops::{BinaryKind, UnaryKind};

/// Which kernel-module set a [`KernelSet`] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// The general (host) kernels.
    General,
    /// The managed-GPU kernels.
    ManagedGpu,
}

/// A cached handle to one kernel-module set.
#[derive(Debug)]
pub struct KernelSet {
    kind: ModuleKind,
}

impl KernelSet {
    /// Which set this handle stands for.
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Invokes one unary kernel of this set.
    pub fn unary(&self, op: UnaryKind, x: &Container, out: Option<&Container>) -> Result<Container> {
        match self.kind {
            ModuleKind::General => super::cpu::unary(op, x, out),
            ModuleKind::ManagedGpu => super::cuda::unary(op, x, out),
        }
    }

    /// Invokes one binary kernel of this set.
    pub fn binary(
        &self,
        op: BinaryKind,
        a: &Container,
        b: &Container,
        out: Option<&Container>,
    ) -> Result<Container> {
        match self.kind {
            ModuleKind::General => super::cpu::binary(op, a, b, out),
            ModuleKind::ManagedGpu => super::cuda::binary(op, a, b, out),
        }
    }
}

lazy_static::lazy_static! {
    static ref GENERAL: KernelSet = KernelSet {
        kind: ModuleKind::General,
    };
    static ref MANAGED: KernelSet = KernelSet {
        kind: ModuleKind::ManagedGpu,
    };
}

/// Picks the kernel set for the given operand devices.
///
/// # Example
/// ```
/// use ragbox::device::DeviceSpec;
/// use ragbox::ops::dispatch::{select, ModuleKind};
///
/// let managed = DeviceSpec::parse("cuda:managed").unwrap();
/// let cpu = DeviceSpec::parse("cpu:0").unwrap();
/// assert_eq!(select([Some(&managed), Some(&managed)]).kind(), ModuleKind::ManagedGpu);
/// assert_eq!(select([Some(&managed), Some(&cpu)]).kind(), ModuleKind::General);
/// assert_eq!(select([None]).kind(), ModuleKind::General);
/// ```
pub fn select<'a>(devices: impl IntoIterator<Item = Option<&'a DeviceSpec>>) -> &'static KernelSet {
    let mut any = false;
    let mut all_managed = true;
    for device in devices {
        any = true;
        if !device.is_some_and(DeviceSpec::is_managed_gpu) {
            all_managed = false;
        }
    }
    if any && all_managed {
        &MANAGED
    } else {
        &GENERAL
    }
}

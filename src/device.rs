//! Device identifiers.
//!
//! A device string has the form `"<name>:<index>"`, where the index is a
//! non-negative integer or the literal token `managed` for shared/unified
//! memory. A container's device is set at construction and immutable
//! thereafter; operator dispatch reads operand devices to pick a kernel set
//! but never relocates data across devices.

use core::fmt;

use crate::error::{Error, Result};

/// Sentinel index for shared/managed memory.
pub const MANAGED: i64 = -1;

/// A normalized (name, index) device pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    name: String,
    index: i64,
}

impl DeviceSpec {
    /// Parses `"<name>:<index>"`, mapping `managed` to the sentinel index.
    ///
    /// # Example
    /// ```
    /// use ragbox::device::{DeviceSpec, MANAGED};
    /// assert_eq!(DeviceSpec::parse("cuda:0").unwrap().index(), 0);
    /// assert_eq!(DeviceSpec::parse("cuda:managed").unwrap().index(), MANAGED);
    /// assert!(DeviceSpec::parse("cuda").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.split(':');
        let (name, index) = match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(index), None) => (name, index),
            _ => {
                return Err(Error::DeviceParse {
                    input: input.to_string(),
                    reason: "expected exactly two ':'-separated parts",
                });
            }
        };
        if name.is_empty() {
            return Err(Error::DeviceParse {
                input: input.to_string(),
                reason: "device name is empty",
            });
        }
        let index = if index == "managed" {
            MANAGED
        } else {
            let n: u32 = index.parse().map_err(|_| Error::DeviceParse {
                input: input.to_string(),
                reason: "device index must be a non-negative integer or 'managed'",
            })?;
            i64::from(n)
        };
        Ok(Self {
            name: name.to_string(),
            index,
        })
    }

    /// The device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The device index; [`MANAGED`] for shared/unified memory.
    pub const fn index(&self) -> i64 {
        self.index
    }

    /// True when the index is the managed sentinel.
    pub const fn is_managed(&self) -> bool {
        self.index == MANAGED
    }

    /// True for the managed-GPU device (`cuda:managed`), the only device the
    /// managed kernel set serves.
    pub fn is_managed_gpu(&self) -> bool {
        self.is_managed() && self.name == "cuda"
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_managed() {
            write!(f, "{}:managed", self.name)
        } else {
            write!(f, "{}:{}", self.name, self.index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_indexed_devices() {
        let d = DeviceSpec::parse("cpu:3").unwrap();
        assert_eq!((d.name(), d.index()), ("cpu", 3));
        assert_eq!(d.to_string(), "cpu:3");
    }

    #[test]
    fn parses_managed() {
        let d = DeviceSpec::parse("cuda:managed").unwrap();
        assert_eq!(d.index(), MANAGED);
        assert!(d.is_managed_gpu());
        assert_eq!(d.to_string(), "cuda:managed");
    }

    #[test]
    fn rejects_malformed_strings() {
        for s in ["cuda", "cuda:0:1", ":0", "cuda:-2", "cuda:zero", ""] {
            assert!(DeviceSpec::parse(s).is_err(), "{s:?} should not parse");
        }
    }
}

//! DLA segment descriptors.
//!
//! Eight 32-bit fields describing one segment of a doubly linked array file:
//! the backward and forward links, then base/size pairs for the integer, double
//! and character components. Transferred as-is; no field is interpreted here.

use ephemgate_membrane::boundary::read_numbers;
use ephemgate_membrane::{HostValue, ShimError};
use serde::{Deserialize, Serialize};

pub const DLA_DESCRIPTOR_LEN: usize = 8;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DlaDescriptor {
    pub backward: i32,
    pub forward: i32,
    pub int_base: i32,
    pub int_size: i32,
    pub double_base: i32,
    pub double_size: i32,
    pub char_base: i32,
    pub char_size: i32,
}

impl DlaDescriptor {
    #[must_use]
    pub const fn from_ints(ints: [i32; DLA_DESCRIPTOR_LEN]) -> Self {
        Self {
            backward: ints[0],
            forward: ints[1],
            int_base: ints[2],
            int_size: ints[3],
            double_base: ints[4],
            double_size: ints[5],
            char_base: ints[6],
            char_size: ints[7],
        }
    }

    #[must_use]
    pub const fn to_ints(&self) -> [i32; DLA_DESCRIPTOR_LEN] {
        [
            self.backward,
            self.forward,
            self.int_base,
            self.int_size,
            self.double_base,
            self.double_size,
            self.char_base,
            self.char_size,
        ]
    }

    pub fn from_slice(ints: &[i32], name: &str) -> Result<Self, ShimError> {
        let ints: [i32; DLA_DESCRIPTOR_LEN] = ints
            .try_into()
            .map_err(|_| ShimError::invalid(name, format!("must have length {DLA_DESCRIPTOR_LEN}")))?;
        Ok(Self::from_ints(ints))
    }

    /// Read from a host array of eight 32-bit integers.
    pub fn from_host(value: &HostValue, name: &str) -> Result<Self, ShimError> {
        let raw = read_numbers::<DLA_DESCRIPTOR_LEN>(value, name)?;
        let mut ints = [0_i32; DLA_DESCRIPTOR_LEN];
        for (dst, v) in ints.iter_mut().zip(raw) {
            *dst = ephemgate_membrane::boundary::read_i32(&HostValue::Number(v), name)?;
        }
        Ok(Self::from_ints(ints))
    }

    /// Host representation: an array of eight numbers.
    #[must_use]
    pub fn to_host(&self) -> HostValue {
        HostValue::Array(
            self.to_ints()
                .iter()
                .map(|&v| HostValue::Number(f64::from(v)))
                .collect(),
        )
    }
}

//! Two-dimensional weight.

use codec::{Compact, Encode, Output};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Computational cost of a call: reference time and proof size.
///
/// The two components are only ever combined component-wise. They are never
/// summed with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Weight {
	pub ref_time: u128,
	pub proof_size: u128,
}

impl Weight {
	pub const fn new(ref_time: u128, proof_size: u128) -> Self {
		Self {
			ref_time,
			proof_size,
		}
	}

	pub const fn zero() -> Self {
		Self::new(0, 0)
	}

	pub fn checked_add(self, other: Self) -> Option<Self> {
		Some(Self {
			ref_time: self.ref_time.checked_add(other.ref_time)?,
			proof_size: self.proof_size.checked_add(other.proof_size)?,
		})
	}

	pub fn checked_mul(self, factor: u128) -> Option<Self> {
		Some(Self {
			ref_time: self.ref_time.checked_mul(factor)?,
			proof_size: self.proof_size.checked_mul(factor)?,
		})
	}
}

impl fmt::Display for Weight {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{{ref_time: {}, proof_size: {}}}",
			self.ref_time, self.proof_size
		)
	}
}

/// Encodes as `Compact(ref_time) ++ Compact(proof_size)`, the runtime's
/// weight layout.
impl Encode for Weight {
	fn size_hint(&self) -> usize {
		Compact(self.ref_time).size_hint() + Compact(self.proof_size).size_hint()
	}

	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		Compact(self.ref_time).encode_to(dest);
		Compact(self.proof_size).encode_to(dest);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_checked_ops_are_component_wise() {
		let w = Weight::new(10, 3);
		assert_eq!(w.checked_add(Weight::new(1, 2)), Some(Weight::new(11, 5)));
		assert_eq!(w.checked_mul(4), Some(Weight::new(40, 12)));
		assert_eq!(Weight::new(u128::MAX, 0).checked_add(Weight::new(1, 0)), None);
		assert_eq!(Weight::new(0, u128::MAX).checked_mul(2), None);
	}

	#[test]
	fn test_weight_encoding() {
		// compact(1_000_000_000) = 0x02286bee, compact(65536) = 0x02000400
		let encoded = Weight::new(1_000_000_000, 65_536).encode();
		assert_eq!(hex::encode(encoded), "02286bee02000400");
	}
}

//! Weight and fee arithmetic.
//!
//! All integer arithmetic. Division truncates, and both ends of a channel
//! rely on computing the same fee, so the truncation is part of the contract.

use alloy::primitives::U256;
use scheduler_types::{Result, SchedulerError, Weight};

/// `call_weight + per_instruction * instruction_count`, component-wise.
pub fn overall_weight(call_weight: Weight, per_instruction: Weight, instruction_count: u32) -> Result<Weight> {
	per_instruction
		.checked_mul(u128::from(instruction_count))
		.and_then(|overhead| call_weight.checked_add(overhead))
		.ok_or(SchedulerError::WeightOverflow("overall weight"))
}

/// `weight.ref_time * fee_per_unit / time_units_per_second`, truncating.
///
/// The product is taken in 256 bits, so only a quotient that does not fit
/// 128 bits overflows.
pub fn fee_amount(weight: Weight, fee_per_unit: u128, time_units_per_second: u128) -> Result<u128> {
	if time_units_per_second == 0 {
		return Err(SchedulerError::InvalidFeeRate);
	}
	let fee = U256::from(weight.ref_time) * U256::from(fee_per_unit) / U256::from(time_units_per_second);
	u128::try_from(fee).map_err(|_| SchedulerError::WeightOverflow("fee amount"))
}

/// Per-chain messaging overhead and fee rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightFeeCalculator {
	pub per_instruction: Weight,
	pub instruction_count: u32,
	pub time_units_per_second: u128,
}

impl WeightFeeCalculator {
	pub fn new(per_instruction: Weight, instruction_count: u32, time_units_per_second: u128) -> Self {
		Self {
			per_instruction,
			instruction_count,
			time_units_per_second,
		}
	}

	/// Weight of a call once the envelope's instructions are added.
	pub fn overall_weight(&self, call_weight: Weight) -> Result<Weight> {
		overall_weight(call_weight, self.per_instruction, self.instruction_count)
	}

	pub fn fee_amount(&self, weight: Weight, fee_per_unit: u128) -> Result<u128> {
		fee_amount(weight, fee_per_unit, self.time_units_per_second)
	}
}

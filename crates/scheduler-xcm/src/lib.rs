//! Cross-chain message building blocks.
//!
//! - `derivation`: derivative accounts under the multilocation-hash (v2) and
//!   sibling-chain (v3) schemes
//! - `weight`: overall weight and fee arithmetic
//! - `assembler`: the nested proxy / schedule / envelope / transport message

pub mod assembler;
pub mod derivation;
pub mod weight;

pub use assembler::{AssembledMessage, FeeDescriptor, MeasuredCall, MessageAssembler, ScheduleParams};
pub use derivation::{derive, derive_v2, derive_v3, DerivationScheme};
pub use weight::{fee_amount, overall_weight, WeightFeeCalculator};

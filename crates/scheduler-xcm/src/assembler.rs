//! Nested message construction.
//!
//! The message is built inside out, always in the same four steps:
//!
//! 1. the inner call is wrapped in `proxy.proxy(owner, Any, inner)` on the
//!    execution chain and measured;
//! 2. that encoding goes into `automationPrice.scheduleXcmpTaskThroughProxy`
//!    on the control chain, which is measured in turn;
//! 3. the schedule call is put in a `WithdrawAsset / BuyExecution / Transact`
//!    envelope paying with the execution chain's native asset;
//! 4. the envelope is sent to the control chain with `polkadotXcm.send`.
//!
//! Every weight embedded in the message is the measured weight of the exact
//! encoding it travels with.

use crate::weight::WeightFeeCalculator;
use scheduler_types::xcm::v3::{Instruction, MultiAsset, MultiLocation, OriginKind, WeightLimit, Xcm};
use scheduler_types::xcm::{VersionedMultiLocation, VersionedXcm};
use scheduler_types::{
	Account, AssetPair, AssetPayment, ChainClientExt, ChainHandle, ProxyType, Result, RuntimeCall,
	ScheduleXcmpTask, SchedulerError, TriggerFunction, UnsignedCall, Weight,
};
use tracing::debug;

/// Trigger and metadata of the task being scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParams {
	/// Chain whose price feed is watched.
	pub chain: String,
	pub exchange: String,
	pub asset_pair: AssetPair,
	pub trigger_function: TriggerFunction,
	pub trigger_params: Vec<u128>,
	/// Unix seconds.
	pub expired_at: u64,
}

/// Asset paying both fees, as a location seen from the control chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeDescriptor {
	pub asset_location: MultiLocation,
}

impl FeeDescriptor {
	/// The native asset of parachain `para_id`.
	pub fn native_of(para_id: u32) -> Self {
		Self {
			asset_location: MultiLocation::sibling(para_id),
		}
	}
}

/// A built call together with the weight measured for that encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasuredCall {
	pub call: UnsignedCall,
	pub weight: Weight,
}

impl MeasuredCall {
	async fn build(chain: &ChainHandle, call: RuntimeCall, fee_payer: &Account) -> Result<Self> {
		let call = chain.build_call(call).await?;
		let weight = chain.estimate_weight(&call, fee_payer).await?;
		Ok(Self { call, weight })
	}
}

/// Everything produced while assembling, for submission and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
	/// `polkadotXcm.send` on the execution chain.
	pub outer_call: UnsignedCall,
	/// `proxy.proxy(owner, Any, inner)`, the call the task runs.
	pub proxied_call: MeasuredCall,
	pub inner_overall_weight: Weight,
	pub execution_fee: u128,
	/// `scheduleXcmpTaskThroughProxy`, the call the envelope transacts.
	pub schedule_call: MeasuredCall,
	pub schedule_overall_weight: Weight,
	pub schedule_fee: u128,
	pub envelope: VersionedXcm,
}

pub struct MessageAssembler {
	execution: ChainHandle,
	control: ChainHandle,
	execution_weights: WeightFeeCalculator,
	control_weights: WeightFeeCalculator,
}

impl MessageAssembler {
	pub fn new(
		execution: ChainHandle,
		control: ChainHandle,
		execution_weights: WeightFeeCalculator,
		control_weights: WeightFeeCalculator,
	) -> Self {
		Self {
			execution,
			control,
			execution_weights,
			control_weights,
		}
	}

	/// Builds the outer transport call for `inner`, to be signed by `owner` on
	/// the execution chain.
	///
	/// `destination` is where the task's call runs, seen from the control
	/// chain.
	pub async fn assemble(
		&self,
		inner: RuntimeCall,
		owner: &Account,
		params: ScheduleParams,
		fee: FeeDescriptor,
		destination: VersionedMultiLocation,
	) -> Result<AssembledMessage> {
		// 1. owner-authorised proxy call on the execution chain
		let inner = self.execution.build_call(inner).await?;
		let proxied_call = MeasuredCall::build(
			&self.execution,
			RuntimeCall::Proxy {
				real: *owner,
				force_proxy_type: Some(ProxyType::Any),
				call: Box::new(inner),
			},
			owner,
		)
		.await?;
		let inner_overall_weight = self.execution_weights.overall_weight(proxied_call.weight)?;
		let execution_fee = self.execution.weight_to_fee(inner_overall_weight).await?;
		debug!(
			chain = %self.execution.name(),
			weight = %proxied_call.weight,
			overall = %inner_overall_weight,
			execution_fee,
			"Measured proxied call"
		);

		// 2. schedule call on the control chain
		let fee_location = VersionedMultiLocation::V3(fee.asset_location.clone());
		let schedule = ScheduleXcmpTask {
			chain: params.chain,
			exchange: params.exchange,
			asset_pair: params.asset_pair,
			expired_at: params.expired_at,
			trigger_function: params.trigger_function,
			trigger_params: params.trigger_params,
			destination,
			schedule_fee: fee_location.clone(),
			execution_fee: AssetPayment {
				asset_location: fee_location.clone(),
				amount: execution_fee,
			},
			encoded_call: proxied_call.call.encoded.clone(),
			encoded_call_weight: proxied_call.weight,
			overall_weight: inner_overall_weight,
			schedule_as: *owner,
		};
		let schedule_call = MeasuredCall::build(
			&self.control,
			RuntimeCall::ScheduleXcmpTaskThroughProxy(Box::new(schedule)),
			owner,
		)
		.await?;
		let schedule_overall_weight = self.control_weights.overall_weight(schedule_call.weight)?;

		// 3. envelope, paid in the fee asset at the control chain's rate
		let schedule_fee = self.control_fee(&fee_location, schedule_overall_weight).await?;
		let fee_asset = MultiAsset::fungible(fee.asset_location, schedule_fee);
		let envelope = VersionedXcm::V3(Xcm(vec![
			Instruction::WithdrawAsset(vec![fee_asset.clone()]),
			Instruction::BuyExecution {
				fees: fee_asset,
				weight_limit: WeightLimit::Limited(schedule_overall_weight),
			},
			Instruction::Transact {
				origin_kind: OriginKind::SovereignAccount,
				require_weight_at_most: schedule_call.weight,
				call: schedule_call.call.encoded.clone(),
			},
		]));

		// 4. transport to the control chain
		let control_para = self.control.para_id().await?;
		let outer_call = self
			.execution
			.build_call(RuntimeCall::XcmSend {
				dest: VersionedMultiLocation::V3(MultiLocation::sibling(control_para)),
				message: envelope.clone(),
			})
			.await?;
		debug!(
			chain = %self.control.name(),
			weight = %schedule_call.weight,
			overall = %schedule_overall_weight,
			schedule_fee,
			"Assembled schedule message"
		);

		Ok(AssembledMessage {
			outer_call,
			proxied_call,
			inner_overall_weight,
			execution_fee,
			schedule_call,
			schedule_overall_weight,
			schedule_fee,
			envelope,
		})
	}

	/// Fee for `weight` on the control chain, paid in the asset registered
	/// there for `location`.
	async fn control_fee(&self, location: &VersionedMultiLocation, weight: Weight) -> Result<u128> {
		let unknown = || SchedulerError::UnknownAsset {
			chain: self.control.name().to_string(),
			asset: format!("{:?}", location),
		};
		let asset_id = self
			.control
			.asset_id_for_location(location.clone())
			.await?
			.ok_or_else(unknown)?;
		let fee_per_second = self
			.control
			.fee_per_second(asset_id)
			.await?
			.ok_or_else(unknown)?;
		self.control_weights.fee_amount(weight, fee_per_second)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use codec::Encode;
	use scheduler_chains::InMemoryChain;
	use scheduler_types::{AccountFormat, CallMethod};
	use std::sync::Arc;

	const OWNER: Account = Account::Id32([7u8; 32]);

	fn calculators() -> (WeightFeeCalculator, WeightFeeCalculator) {
		(
			WeightFeeCalculator::new(Weight::new(1_000_000_000, 65_536), 4, 1_000_000_000_000),
			WeightFeeCalculator::new(Weight::new(1_000_000_000, 0), 4, 1_000_000_000_000),
		)
	}

	fn chains(register_asset: bool) -> (Arc<InMemoryChain>, Arc<InMemoryChain>) {
		let execution = Arc::new(InMemoryChain::new("shibuya", 2000, AccountFormat::AccountId32));
		let control = Arc::new(InMemoryChain::new("turing", 2114, AccountFormat::AccountId32));
		execution.set_call_weight(CallMethod::new("proxy", "proxy"), Weight::new(500_000_000, 10_000));
		execution.set_weight_to_fee(1, 1_000);
		control.set_call_weight(
			CallMethod::new("automationPrice", "scheduleXcmpTaskThroughProxy"),
			Weight::new(800_000_000, 5_000),
		);
		if register_asset {
			control.register_asset(
				VersionedMultiLocation::V3(MultiLocation::sibling(2000)),
				1,
				416_000_000_000,
			);
		}
		(execution, control)
	}

	fn params() -> ScheduleParams {
		ScheduleParams {
			chain: "shibuya".into(),
			exchange: "arthswap".into(),
			asset_pair: AssetPair::new("WRSTR", "USDT"),
			trigger_function: TriggerFunction::GreaterThan,
			trigger_params: vec![100],
			expired_at: 1_700_000_000,
		}
	}

	fn inner_call() -> RuntimeCall {
		RuntimeCall::Opaque {
			method: CallMethod::new("ethereumChecked", "transact"),
			args: vec![0xde, 0xad],
		}
	}

	#[tokio::test]
	async fn test_assemble_builds_layers_in_order() {
		let (execution, control) = chains(true);
		let (exec_weights, control_weights) = calculators();
		let assembler = MessageAssembler::new(execution, control, exec_weights, control_weights);

		let message = assembler
			.assemble(
				inner_call(),
				&OWNER,
				params(),
				FeeDescriptor::native_of(2000),
				VersionedMultiLocation::V3(MultiLocation::sibling(2000)),
			)
			.await
			.unwrap();

		// 1. proxy wrapper around the inner call
		let RuntimeCall::Proxy { real, call, .. } = &message.proxied_call.call.call else {
			panic!("expected proxy call");
		};
		assert_eq!(*real, OWNER);
		assert_eq!(call.method, CallMethod::new("ethereumChecked", "transact"));
		assert_eq!(message.inner_overall_weight, Weight::new(4_500_000_000, 272_144));
		assert_eq!(message.execution_fee, 4_500_000);

		// 2. schedule call carries the measured proxy encoding and weights
		let RuntimeCall::ScheduleXcmpTaskThroughProxy(args) = &message.schedule_call.call.call else {
			panic!("expected schedule call");
		};
		assert_eq!(args.encoded_call, message.proxied_call.call.encoded);
		assert_eq!(args.encoded_call_weight, Weight::new(500_000_000, 10_000));
		assert_eq!(args.overall_weight, message.inner_overall_weight);
		assert_eq!(args.execution_fee.amount, 4_500_000);
		assert_eq!(args.schedule_as, OWNER);

		// 3. envelope transacts exactly the measured schedule call
		assert_eq!(message.schedule_overall_weight, Weight::new(4_800_000_000, 5_000));
		assert_eq!(message.schedule_fee, 1_996_800_000);
		let VersionedXcm::V3(Xcm(instructions)) = &message.envelope;
		assert_eq!(instructions.len(), 3);
		assert!(matches!(instructions[0], Instruction::WithdrawAsset(_)));
		assert!(matches!(
			instructions[1],
			Instruction::BuyExecution {
				weight_limit: WeightLimit::Limited(w),
				..
			} if w == message.schedule_overall_weight
		));
		match &instructions[2] {
			Instruction::Transact {
				origin_kind,
				require_weight_at_most,
				call,
			} => {
				assert_eq!(*origin_kind, OriginKind::SovereignAccount);
				assert_eq!(*require_weight_at_most, message.schedule_call.weight);
				assert_eq!(*call, message.schedule_call.call.encoded);
			}
			other => panic!("unexpected instruction {:?}", other),
		}

		// 4. transport addressed to the control chain
		assert_eq!(message.outer_call.method, CallMethod::new("polkadotXcm", "send"));
		let RuntimeCall::XcmSend { dest, message: sent } = &message.outer_call.call else {
			panic!("expected xcm send");
		};
		assert_eq!(*dest, VersionedMultiLocation::V3(MultiLocation::sibling(2114)));
		assert_eq!(sent.encode(), message.envelope.encode());
	}

	#[tokio::test]
	async fn test_unregistered_fee_asset() {
		let (execution, control) = chains(false);
		let (exec_weights, control_weights) = calculators();
		let assembler = MessageAssembler::new(execution, control, exec_weights, control_weights);

		let err = assembler
			.assemble(
				inner_call(),
				&OWNER,
				params(),
				FeeDescriptor::native_of(2000),
				VersionedMultiLocation::V3(MultiLocation::sibling(2000)),
			)
			.await
			.unwrap_err();
		assert!(matches!(err, SchedulerError::UnknownAsset { ref chain, .. } if chain == "turing"));
	}
}

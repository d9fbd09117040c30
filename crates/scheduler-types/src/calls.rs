//! Runtime calls the scheduler builds.
//!
//! A `RuntimeCall` is the typed description of a call. Its arguments are SCALE
//! encoded here; the chain client contributes the pallet and call indices when
//! it turns the description into an `UnsignedCall`.

use crate::account::{Account, Signature};
use crate::task::{AssetPair, AssetPayment, TaskId, TriggerFunction};
use crate::weight::Weight;
use crate::xcm::{v3::WeightLimit, VersionedMultiAsset, VersionedMultiLocation, VersionedXcm};
use codec::{Compact, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `section.method` name of a call or event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallMethod {
	pub section: String,
	pub method: String,
}

impl CallMethod {
	pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
		Self {
			section: section.into(),
			method: method.into(),
		}
	}
}

impl fmt::Display for CallMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.section, self.method)
	}
}

/// Proxy permission class. Indices match the target runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
	#[codec(index = 0)]
	Any,
	#[codec(index = 1)]
	NonTransfer,
	#[codec(index = 2)]
	CancelProxy,
}

impl fmt::Display for ProxyType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Any => write!(f, "Any"),
			Self::NonTransfer => write!(f, "NonTransfer"),
			Self::CancelProxy => write!(f, "CancelProxy"),
		}
	}
}

/// One entry of an account's proxy list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyDefinition {
	pub delegate: Account,
	pub proxy_type: ProxyType,
	pub delay: u32,
}

/// Arguments of `automationPrice.scheduleXcmpTaskThroughProxy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleXcmpTask {
	pub chain: String,
	pub exchange: String,
	pub asset_pair: AssetPair,
	pub expired_at: u64,
	pub trigger_function: TriggerFunction,
	pub trigger_params: Vec<u128>,
	pub destination: VersionedMultiLocation,
	pub schedule_fee: VersionedMultiLocation,
	pub execution_fee: AssetPayment,
	pub encoded_call: Vec<u8>,
	pub encoded_call_weight: Weight,
	pub overall_weight: Weight,
	pub schedule_as: Account,
}

impl Encode for ScheduleXcmpTask {
	fn encode_to<T: codec::Output + ?Sized>(&self, dest: &mut T) {
		self.chain.as_bytes().encode_to(dest);
		self.exchange.as_bytes().encode_to(dest);
		self.asset_pair.base.as_bytes().encode_to(dest);
		self.asset_pair.quote.as_bytes().encode_to(dest);
		(self.expired_at as u128).encode_to(dest);
		self.trigger_function.as_str().as_bytes().encode_to(dest);
		self.trigger_params.encode_to(dest);
		self.destination.encode_to(dest);
		self.schedule_fee.encode_to(dest);
		self.execution_fee.encode_to(dest);
		self.encoded_call.encode_to(dest);
		self.encoded_call_weight.encode_to(dest);
		self.overall_weight.encode_to(dest);
		self.schedule_as.encode_to(dest);
	}
}

/// Typed description of every call the scheduler submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
	/// `balances.transfer`
	Transfer { dest: Account, value: u128 },
	/// `proxy.addProxy`
	AddProxy {
		delegate: Account,
		proxy_type: ProxyType,
		delay: u32,
	},
	/// `proxy.proxy`: dispatch `call` as `real`.
	Proxy {
		real: Account,
		force_proxy_type: Option<ProxyType>,
		call: Box<UnsignedCall>,
	},
	/// `xtokens.transferMultiasset`
	TransferMultiasset {
		asset: VersionedMultiAsset,
		dest: VersionedMultiLocation,
		dest_weight_limit: WeightLimit,
	},
	/// `automationPrice.scheduleXcmpTaskThroughProxy`
	ScheduleXcmpTaskThroughProxy(Box<ScheduleXcmpTask>),
	/// `automationPrice.cancelTask`
	CancelTask { task_id: TaskId },
	/// `polkadotXcm.send`
	XcmSend {
		dest: VersionedMultiLocation,
		message: VersionedXcm,
	},
	/// `utility.batch`
	Batch { calls: Vec<UnsignedCall> },
	/// Any other call, with pre-encoded arguments.
	Opaque { method: CallMethod, args: Vec<u8> },
}

impl RuntimeCall {
	pub fn method(&self) -> CallMethod {
		match self {
			Self::Transfer { .. } => CallMethod::new("balances", "transfer"),
			Self::AddProxy { .. } => CallMethod::new("proxy", "addProxy"),
			Self::Proxy { .. } => CallMethod::new("proxy", "proxy"),
			Self::TransferMultiasset { .. } => CallMethod::new("xtokens", "transferMultiasset"),
			Self::ScheduleXcmpTaskThroughProxy(_) => {
				CallMethod::new("automationPrice", "scheduleXcmpTaskThroughProxy")
			}
			Self::CancelTask { .. } => CallMethod::new("automationPrice", "cancelTask"),
			Self::XcmSend { .. } => CallMethod::new("polkadotXcm", "send"),
			Self::Batch { .. } => CallMethod::new("utility", "batch"),
			Self::Opaque { method, .. } => method.clone(),
		}
	}

	/// SCALE encoding of the call arguments, without pallet and call indices.
	pub fn encode_args(&self) -> Vec<u8> {
		let mut out = Vec::new();
		match self {
			Self::Transfer { dest, value } => {
				encode_lookup(dest, &mut out);
				Compact(*value).encode_to(&mut out);
			}
			Self::AddProxy {
				delegate,
				proxy_type,
				delay,
			} => {
				encode_lookup(delegate, &mut out);
				proxy_type.encode_to(&mut out);
				delay.encode_to(&mut out);
			}
			Self::Proxy {
				real,
				force_proxy_type,
				call,
			} => {
				encode_lookup(real, &mut out);
				force_proxy_type.encode_to(&mut out);
				out.extend_from_slice(&call.encoded);
			}
			Self::TransferMultiasset {
				asset,
				dest,
				dest_weight_limit,
			} => {
				asset.encode_to(&mut out);
				dest.encode_to(&mut out);
				dest_weight_limit.encode_to(&mut out);
			}
			Self::ScheduleXcmpTaskThroughProxy(args) => args.encode_to(&mut out),
			Self::CancelTask { task_id } => task_id.encode_to(&mut out),
			Self::XcmSend { dest, message } => {
				dest.encode_to(&mut out);
				message.encode_to(&mut out);
			}
			Self::Batch { calls } => {
				Compact(calls.len() as u32).encode_to(&mut out);
				for call in calls {
					out.extend_from_slice(&call.encoded);
				}
			}
			Self::Opaque { args, .. } => out.extend_from_slice(args),
		}
		out
	}
}

/// 32-byte accounts are addressed through `MultiAddress::Id`; 20-byte chains
/// take the raw key.
fn encode_lookup(account: &Account, out: &mut Vec<u8>) {
	if let Account::Id32(id) = account {
		out.push(0);
		out.extend_from_slice(id);
	} else {
		account.encode_to(out);
	}
}

/// A call built by a specific chain client, with its final encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedCall {
	pub method: CallMethod,
	pub call: RuntimeCall,
	pub encoded: Vec<u8>,
}

impl UnsignedCall {
	/// Assembles the encoding `pallet_index ++ call_index ++ args`.
	pub fn new(call: RuntimeCall, pallet_index: u8, call_index: u8) -> Self {
		let mut encoded = vec![pallet_index, call_index];
		encoded.extend(call.encode_args());
		Self {
			method: call.method(),
			call,
			encoded,
		}
	}
}

/// An unsigned call together with the signer's account and signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCall {
	pub call: UnsignedCall,
	pub signer: Account,
	pub signature: Signature,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unsigned_call_prefixes_indices() {
		let call = UnsignedCall::new(
			RuntimeCall::CancelTask {
				task_id: TaskId::new("7"),
			},
			60,
			3,
		);
		assert_eq!(call.method.to_string(), "automationPrice.cancelTask");
		assert_eq!(call.encoded, vec![60, 3, 4, b'7']);
	}

	#[test]
	fn test_batch_concatenates_inner_calls() {
		let first = UnsignedCall::new(
			RuntimeCall::Opaque {
				method: CallMethod::new("system", "remark"),
				args: vec![0],
			},
			0,
			1,
		);
		let second = first.clone();
		let batch = RuntimeCall::Batch {
			calls: vec![first, second],
		};
		assert_eq!(batch.encode_args(), vec![8, 0, 1, 0, 0, 1, 0]);
	}

	#[test]
	fn test_transfer_uses_multiaddress_for_id32() {
		let args = RuntimeCall::Transfer {
			dest: Account::Id32([9u8; 32]),
			value: 1,
		}
		.encode_args();
		assert_eq!(args[0], 0);
		assert_eq!(args.len(), 1 + 32 + 1);

		let args = RuntimeCall::Transfer {
			dest: Account::Key20([9u8; 20]),
			value: 1,
		}
		.encode_args();
		assert_eq!(args.len(), 20 + 1);
	}

	#[test]
	fn test_proxy_embeds_inner_encoding() {
		let inner = UnsignedCall::new(
			RuntimeCall::Opaque {
				method: CallMethod::new("ethereumChecked", "transact"),
				args: vec![0xab],
			},
			90,
			0,
		);
		let args = RuntimeCall::Proxy {
			real: Account::Key20([1u8; 20]),
			force_proxy_type: Some(ProxyType::Any),
			call: Box::new(inner),
		}
		.encode_args();
		// raw key, Some(Any), inner call bytes
		assert_eq!(&args[20..], &[1, 0, 90, 0, 0xab]);
	}
}

//! Scheduled tasks as the control chain stores them.

use crate::account::Account;
use crate::weight::Weight;
use crate::xcm::VersionedMultiLocation;
use codec::Encode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chain-assigned task identifier.
#[derive(
	Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for TaskId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for TaskId {
	fn from(id: &str) -> Self {
		Self(id.to_string())
	}
}

/// Price comparison that triggers a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerFunction {
	#[serde(rename = "lt")]
	LessThan,
	#[serde(rename = "gt")]
	GreaterThan,
}

impl TriggerFunction {
	/// Wire name accepted by the scheduling pallet.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::LessThan => "lt",
			Self::GreaterThan => "gt",
		}
	}

	pub fn symbol(&self) -> &'static str {
		match self {
			Self::LessThan => "<",
			Self::GreaterThan => ">",
		}
	}
}

impl FromStr for TriggerFunction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"lt" | "<" => Ok(Self::LessThan),
			"gt" | ">" => Ok(Self::GreaterThan),
			other => Err(format!("unknown trigger function '{}'", other)),
		}
	}
}

/// Asset pair the trigger observes, e.g. `WRSTR-USDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
	pub base: String,
	pub quote: String,
}

impl AssetPair {
	pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
		Self {
			base: base.into(),
			quote: quote.into(),
		}
	}
}

impl fmt::Display for AssetPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}-{}", self.base, self.quote)
	}
}

/// Amount of an asset identified by location, used to pay execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
pub struct AssetPayment {
	pub asset_location: VersionedMultiLocation,
	pub amount: u128,
}

/// What a task does once triggered: send `encoded_call` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAction {
	pub destination: VersionedMultiLocation,
	pub schedule_fee: VersionedMultiLocation,
	pub execution_fee: AssetPayment,
	#[serde(with = "hex_bytes")]
	pub encoded_call: Vec<u8>,
	pub encoded_call_weight: Weight,
	pub overall_weight: Weight,
	pub schedule_as: Option<Account>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
	pub task_id: TaskId,
	pub owner: Account,
	pub chain: String,
	pub exchange: String,
	pub asset_pair: AssetPair,
	pub expired_at: u64,
	pub trigger_function: TriggerFunction,
	pub trigger_params: Vec<u128>,
	pub action: TaskAction,
}

impl Task {
	/// Display form of the observed pair, `BASE-QUOTE`.
	pub fn asset(&self) -> String {
		self.asset_pair.to_string()
	}

	/// Display form of the trigger, e.g. `> 100`.
	pub fn condition(&self) -> String {
		match self.trigger_params.first() {
			Some(value) => format!("{} {}", self.trigger_function.symbol(), value),
			None => self.trigger_function.symbol().to_string(),
		}
	}

	pub fn execution_fee(&self) -> u128 {
		self.action.execution_fee.amount
	}
}

/// Lifecycle of a task as observed from chain events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
	Scheduled,
	Triggered,
	Completed,
	Cancelled,
}

impl TaskStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::Completed | Self::Cancelled)
	}

	fn rank(&self) -> u8 {
		match self {
			Self::Scheduled => 0,
			Self::Triggered => 1,
			Self::Completed | Self::Cancelled => 2,
		}
	}

	/// Transitions only move forward; terminal states never change.
	pub fn can_transition_to(&self, next: TaskStatus) -> bool {
		!self.is_terminal() && next.rank() > self.rank()
	}
}

impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Scheduled => write!(f, "Scheduled"),
			Self::Triggered => write!(f, "Triggered"),
			Self::Completed => write!(f, "Completed"),
			Self::Cancelled => write!(f, "Cancelled"),
		}
	}
}

mod hex_bytes {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
	}
}

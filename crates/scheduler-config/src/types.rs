//! Configuration types for the scheduler.

use crate::serde_helpers::amount;
use scheduler_types::xcm::{LocationVersion, Network};
use scheduler_types::{AccountFormat, ProxyType, Weight};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
	/// Engine identity and logging
	pub engine: EngineSettings,
	/// The two chains the scheduler bridges
	pub chains: ChainsConfig,
	/// Derivative account scheme used on the control chain
	#[serde(default)]
	pub derivation: DerivationConfig,
	/// Minimum balances and proxy settings
	pub provisioning: ProvisioningConfig,
	/// Messaging overhead and fee conversion
	#[serde(default)]
	pub weights: WeightConfig,
	/// Timeouts for event correlation
	#[serde(default)]
	pub correlation: CorrelationConfig,
	/// Defaults applied to new tasks
	#[serde(default)]
	pub task: TaskDefaults,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Capacity of the engine's broadcast event bus
	#[serde(default = "default_event_bus_capacity")]
	pub event_bus_capacity: usize,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_event_bus_capacity() -> usize {
	256
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainsConfig {
	/// Chain where the swap executes and where the batch is submitted
	pub execution: ChainConfig,
	/// Chain that stores and triggers tasks
	pub control: ChainConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// Chain name for logging and task records
	pub name: String,
	/// Node endpoint
	pub endpoint: String,
	/// Parachain id of this chain
	pub para_id: u32,
	pub account_format: AccountFormat,
}

/// The multilocation-hash derivation is parameterised by the relay network
/// and the location layout the control chain hashes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DerivationConfig {
	#[serde(default = "default_network")]
	pub network: Network,
	#[serde(default = "default_location_version")]
	pub location_version: LocationVersion,
}

fn default_network() -> Network {
	Network::Any
}

fn default_location_version() -> LocationVersion {
	LocationVersion::V3
}

impl Default for DerivationConfig {
	fn default() -> Self {
		Self {
			network: default_network(),
			location_version: default_location_version(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisioningConfig {
	#[serde(default = "default_proxy_type")]
	pub proxy_type: ProxyType,
	/// Native balance the execution-side derivative must hold
	#[serde(with = "amount")]
	pub min_derivative_balance: u128,
	/// Balance of the execution chain's asset the control-side derivative
	/// must hold to pay for scheduling
	#[serde(with = "amount")]
	pub min_derivative_asset_balance: u128,
}

fn default_proxy_type() -> ProxyType {
	ProxyType::Any
}

/// A weight written in configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct WeightSetting {
	#[serde(with = "amount")]
	pub ref_time: u128,
	#[serde(with = "amount")]
	pub proof_size: u128,
}

impl From<WeightSetting> for Weight {
	fn from(setting: WeightSetting) -> Self {
		Weight::new(setting.ref_time, setting.proof_size)
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeightConfig {
	/// Per-instruction overhead charged by the execution chain
	#[serde(default = "default_execution_instruction_weight")]
	pub execution_instruction_weight: WeightSetting,
	/// Per-instruction overhead charged by the control chain
	#[serde(default = "default_control_instruction_weight")]
	pub control_instruction_weight: WeightSetting,
	#[serde(default = "default_instruction_count")]
	pub instruction_count: u32,
	#[serde(default = "default_ref_time_per_second", with = "amount")]
	pub ref_time_per_second: u128,
}

fn default_execution_instruction_weight() -> WeightSetting {
	WeightSetting {
		ref_time: 1_000_000_000,
		proof_size: 64 * 1024,
	}
}

fn default_control_instruction_weight() -> WeightSetting {
	WeightSetting {
		ref_time: 1_000_000_000,
		proof_size: 0,
	}
}

fn default_instruction_count() -> u32 {
	4
}

fn default_ref_time_per_second() -> u128 {
	1_000_000_000_000
}

impl Default for WeightConfig {
	fn default() -> Self {
		Self {
			execution_instruction_weight: default_execution_instruction_weight(),
			control_instruction_weight: default_control_instruction_weight(),
			instruction_count: default_instruction_count(),
			ref_time_per_second: default_ref_time_per_second(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorrelationConfig {
	#[serde(default = "default_timeout_ms")]
	pub scheduled_timeout_ms: u64,
	#[serde(default = "default_timeout_ms")]
	pub triggered_timeout_ms: u64,
	#[serde(default = "default_timeout_ms")]
	pub executed_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
	60_000
}

impl CorrelationConfig {
	pub fn scheduled_timeout(&self) -> Duration {
		Duration::from_millis(self.scheduled_timeout_ms)
	}

	pub fn triggered_timeout(&self) -> Duration {
		Duration::from_millis(self.triggered_timeout_ms)
	}

	pub fn executed_timeout(&self) -> Duration {
		Duration::from_millis(self.executed_timeout_ms)
	}
}

impl Default for CorrelationConfig {
	fn default() -> Self {
		Self {
			scheduled_timeout_ms: default_timeout_ms(),
			triggered_timeout_ms: default_timeout_ms(),
			executed_timeout_ms: default_timeout_ms(),
		}
	}
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskDefaults {
	/// Chain whose price feed triggers the task
	#[serde(default = "default_price_chain")]
	pub price_chain: String,
	#[serde(default = "default_exchange")]
	pub exchange: String,
	#[serde(default = "default_expiry_days")]
	pub expiry_days: u64,
}

fn default_price_chain() -> String {
	"shibuya".to_string()
}

fn default_exchange() -> String {
	"arthswap".to_string()
}

fn default_expiry_days() -> u64 {
	7
}

impl Default for TaskDefaults {
	fn default() -> Self {
		Self {
			price_chain: default_price_chain(),
			exchange: default_exchange(),
			expiry_days: default_expiry_days(),
		}
	}
}

//! Scheduler engine.
//!
//! `EngineBuilder` wires configuration and explicitly opened chain handles
//! into a `SchedulerEngine`, which exposes the operations a UI needs:
//! schedule and cancel tasks, follow the task list, track one task's
//! execution, and derive accounts for display.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod reconciler;

pub use engine::{ScheduleReceipt, SchedulerEngine, TaskListSubscription, TaskRequest};
pub use error::CoreError;
pub use lifecycle::{EngineState, Lifecycle};
pub use reconciler::{TaskEntry, TaskMap, TaskReconciler};

use scheduler_chains::ChainRegistry;
use scheduler_config::SchedulerConfig;
use scheduler_delivery::BatchSubmitter;
use scheduler_provisioning::ProvisioningPlanner;
use scheduler_types::{ChainClientExt, ChainHandle, EventBus};
use scheduler_xcm::{MessageAssembler, WeightFeeCalculator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

pub struct EngineBuilder {
	config: SchedulerConfig,
	chains: Vec<ChainHandle>,
	event_bus: Option<EventBus>,
	resync_interval: Option<Duration>,
}

impl EngineBuilder {
	pub fn new(config: SchedulerConfig) -> Self {
		Self {
			config,
			chains: Vec::new(),
			event_bus: None,
			resync_interval: None,
		}
	}

	/// Adds an opened chain handle. The engine picks its execution and control
	/// chains by the names in the configuration.
	pub fn with_chain(mut self, chain: ChainHandle) -> Self {
		self.chains.push(chain);
		self
	}

	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = Some(event_bus);
		self
	}

	/// Re-read the task store on this interval in addition to following
	/// events.
	pub fn with_resync_interval(mut self, interval: Duration) -> Self {
		self.resync_interval = Some(interval);
		self
	}

	pub async fn build(self) -> Result<SchedulerEngine, CoreError> {
		let mut registry = ChainRegistry::new();
		for chain in self.chains {
			registry.register(chain)?;
		}

		let chains = &self.config.chains;
		let execution = registry.get_required(&chains.execution.name)?;
		let control = registry.get_required(&chains.control.name)?;

		for (handle, expected) in [(&execution, &chains.execution), (&control, &chains.control)] {
			let para_id = handle.para_id().await?;
			if para_id != expected.para_id {
				return Err(CoreError::Configuration(format!(
					"Chain {} reports para id {}, configured {}",
					expected.name, para_id, expected.para_id
				)));
			}
		}

		let weights = &self.config.weights;
		let assembler = MessageAssembler::new(
			execution.clone(),
			control.clone(),
			WeightFeeCalculator::new(
				weights.execution_instruction_weight.into(),
				weights.instruction_count,
				weights.ref_time_per_second,
			),
			WeightFeeCalculator::new(
				weights.control_instruction_weight.into(),
				weights.instruction_count,
				weights.ref_time_per_second,
			),
		);

		let event_bus = self
			.event_bus
			.unwrap_or_else(|| EventBus::new(self.config.engine.event_bus_capacity));
		let submitter = BatchSubmitter::new().with_event_bus(event_bus.clone());

		info!(
			engine = %self.config.engine.name,
			execution = %execution.name(),
			control = %control.name(),
			"Engine built"
		);

		Ok(SchedulerEngine {
			config: self.config,
			chains: Mutex::new(registry),
			execution,
			control,
			planner: ProvisioningPlanner::new(),
			assembler,
			submitter,
			reconciler: Arc::new(TaskReconciler::new()),
			lifecycle: Arc::new(Lifecycle::new()),
			event_bus,
			resync_interval: self.resync_interval,
			sync_task: Mutex::new(None),
		})
	}
}

//! Three-stage execution tracking across both chains.
//!
//! 1. `automationPrice.TaskScheduled` on the control chain (or the task is
//!    already in storage);
//! 2. `automationPrice.TaskTriggered` on the control chain, with the
//!    `xcmpQueue.XcmpMessageSent` that follows it in the same block;
//! 3. `xcmpQueue.Success` (or `Fail`) for that message hash on the execution
//!    chain, with the `proxy.ProxyExecuted` that precedes it.
//!
//! Each stage can only be observed after the previous one, but all
//! subscriptions are opened up front so nothing is missed while an earlier
//! stage is still being waited for. The execution chain may seal the stage 3
//! block before the control chain's stage 2 block reaches us, so its
//! subscription cannot wait for stage 2 either. Until stage 3 is read, every
//! execution chain block since `start` stays queued in that subscription:
//! memory grows with the execution chain's block count over at most the
//! scheduled plus triggered timeouts, and is released as soon as tracking
//! ends or the `Tracking` is dropped. A stage that is not observed in time
//! ends tracking; the report then says how far it got, which is not a
//! failure.

use crate::correlator::{CorrelationOutcome, EventCorrelator, EventFilter, PendingWait};
use crate::subscription::ScopedSubscription;
use scheduler_types::{
	ChainClientExt, ChainError, ChainEvent, ChainHandle, DispatchError, EventBus, SchedulerEvent,
	TaskId, H256,
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
	pub scheduled: Duration,
	pub triggered: Duration,
	pub executed: Duration,
}

impl Default for StageTimeouts {
	fn default() -> Self {
		Self {
			scheduled: Duration::from_secs(60),
			triggered: Duration::from_secs(60),
			executed: Duration::from_secs(60),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ExecutionStage {
	Scheduled,
	Triggered,
	Executed,
}

impl fmt::Display for ExecutionStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Scheduled => write!(f, "scheduled"),
			Self::Triggered => write!(f, "triggered"),
			Self::Executed => write!(f, "executed"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredStage {
	/// Hash of the message carrying the task's call, if the block had one.
	pub message_hash: Option<H256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStage {
	pub message_hash: H256,
	/// `xcmpQueue.Success` rather than `Fail`.
	pub success: bool,
	pub error: Option<String>,
	/// Result of the proxied call, when the block reported it.
	pub proxy_result: Option<Result<(), DispatchError>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
	pub task_id: TaskId,
	pub scheduled: bool,
	pub triggered: Option<TriggeredStage>,
	pub executed: Option<ExecutedStage>,
}

impl ExecutionReport {
	fn new(task_id: TaskId) -> Self {
		Self {
			task_id,
			scheduled: false,
			triggered: None,
			executed: None,
		}
	}

	pub fn last_observed(&self) -> Option<ExecutionStage> {
		if self.executed.is_some() {
			Some(ExecutionStage::Executed)
		} else if self.triggered.is_some() {
			Some(ExecutionStage::Triggered)
		} else if self.scheduled {
			Some(ExecutionStage::Scheduled)
		} else {
			None
		}
	}
}

pub struct ExecutionTracker {
	control: ChainHandle,
	execution: ChainHandle,
	timeouts: StageTimeouts,
	event_bus: Option<EventBus>,
}

impl ExecutionTracker {
	pub fn new(control: ChainHandle, execution: ChainHandle) -> Self {
		Self {
			control,
			execution,
			timeouts: StageTimeouts::default(),
			event_bus: None,
		}
	}

	pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
		self.timeouts = timeouts;
		self
	}

	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = Some(event_bus);
		self
	}

	/// Opens every subscription and checks whether the task is already
	/// stored. Events from this point on are not missed.
	///
	/// Execution chain blocks are queued from here until stage 3 is read, so
	/// call this shortly before the task can trigger.
	pub async fn start(&self, task_id: &TaskId) -> Result<Tracking, ChainError> {
		let control = EventCorrelator::new(self.control.clone());
		let scheduled = control
			.subscribe(EventFilter::new("automationPrice", "TaskScheduled").task_id(task_id.clone()))
			.await?
			.with_timeout(Some(self.timeouts.scheduled));
		let triggered = control
			.subscribe(EventFilter::new("automationPrice", "TaskTriggered").task_id(task_id.clone()))
			.await?
			.with_timeout(Some(self.timeouts.triggered));
		let execution = ScopedSubscription::open(self.execution.clone()).await?;

		let stored = self
			.control
			.tasks()
			.await?
			.iter()
			.any(|task| &task.task_id == task_id);

		Ok(Tracking {
			task_id: task_id.clone(),
			scheduled: if stored { None } else { Some(scheduled) },
			triggered,
			execution,
			executed_timeout: self.timeouts.executed,
			event_bus: self.event_bus.clone(),
		})
	}

	pub async fn track(&self, task_id: &TaskId) -> Result<ExecutionReport, ChainError> {
		Ok(self.start(task_id).await?.wait().await)
	}
}

/// Tracking in progress. Dropping it releases every subscription.
pub struct Tracking {
	task_id: TaskId,
	/// `None` when the task was already in storage.
	scheduled: Option<PendingWait>,
	triggered: PendingWait,
	execution: ScopedSubscription,
	executed_timeout: Duration,
	event_bus: Option<EventBus>,
}

impl Tracking {
	pub async fn wait(self) -> ExecutionReport {
		let Self {
			task_id,
			scheduled,
			triggered,
			execution,
			executed_timeout,
			event_bus,
		} = self;
		let stages = StageLog {
			task_id: &task_id,
			event_bus: event_bus.as_ref(),
		};
		let mut report = ExecutionReport::new(task_id.clone());

		if let Some(scheduled) = scheduled {
			if !scheduled.wait().await.is_matched() {
				stages.not_observed(ExecutionStage::Scheduled);
				return report;
			}
		}
		report.scheduled = true;
		stages.observed(ExecutionStage::Scheduled);

		let Some(matched) = triggered.wait().await.into_match() else {
			stages.not_observed(ExecutionStage::Triggered);
			return report;
		};
		let message_hash = matched
			.following()
			.iter()
			.find_map(|record| match &record.event {
				ChainEvent::XcmpMessageSent { message_hash } => Some(*message_hash),
				_ => None,
			});
		report.triggered = Some(TriggeredStage { message_hash });
		stages.observed(ExecutionStage::Triggered);

		let Some(message_hash) = message_hash else {
			warn!(%task_id, "Trigger block carried no outbound message");
			stages.not_observed(ExecutionStage::Executed);
			return report;
		};

		let filter = EventFilter::new("xcmpQueue", "Success")
			.or_method("Fail")
			.message_hash(message_hash);
		let outcome = PendingWait::new(execution, filter, Some(executed_timeout)).wait().await;
		let CorrelationOutcome::Matched(matched) = outcome else {
			stages.not_observed(ExecutionStage::Executed);
			return report;
		};

		let error = match matched.event() {
			ChainEvent::XcmpFail { error, .. } => Some(error.clone()),
			_ => None,
		};
		let proxy_result = matched
			.preceding()
			.iter()
			.rev()
			.find_map(|record| match &record.event {
				ChainEvent::ProxyExecuted { result } => Some(result.clone()),
				_ => None,
			});
		report.executed = Some(ExecutedStage {
			message_hash,
			success: error.is_none(),
			error,
			proxy_result,
		});
		stages.observed(ExecutionStage::Executed);
		report
	}
}

struct StageLog<'a> {
	task_id: &'a TaskId,
	event_bus: Option<&'a EventBus>,
}

impl StageLog<'_> {
	fn observed(&self, stage: ExecutionStage) {
		info!(task_id = %self.task_id, %stage, "Stage observed");
		if let Some(bus) = self.event_bus {
			let _ = bus.publish(SchedulerEvent::StageObserved {
				task_id: self.task_id.clone(),
				stage: stage.to_string(),
			});
		}
	}

	fn not_observed(&self, stage: ExecutionStage) {
		warn!(task_id = %self.task_id, %stage, "Stage not observed in time");
		if let Some(bus) = self.event_bus {
			let _ = bus.publish(SchedulerEvent::StageNotObserved {
				task_id: self.task_id.clone(),
				stage: stage.to_string(),
			});
		}
	}
}

//! Chain events and engine events.
//!
//! Chain events are decoded once, at the client boundary, into tagged variants
//! keyed by `(section, method)`. Engine events are what the scheduler publishes
//! on its own `EventBus` for observers.

use crate::account::Account;
use crate::calls::ProxyType;
use crate::hashing::H256;
use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Where in the block an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
	ApplyExtrinsic(u32),
	Finalization,
	Initialization,
}

/// A module error resolved against chain metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleError {
	pub section: String,
	pub method: String,
	pub docs: String,
}

impl ModuleError {
	pub fn new(section: impl Into<String>, method: impl Into<String>, docs: impl Into<String>) -> Self {
		Self {
			section: section.into(),
			method: method.into(),
			docs: docs.into(),
		}
	}
}

impl fmt::Display for ModuleError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}: {}", self.section, self.method, self.docs)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchError {
	Module(ModuleError),
	BadOrigin,
	Other(String),
}

impl DispatchError {
	/// Decoded module error, or a synthetic one for non-module failures.
	pub fn to_module_error(&self) -> ModuleError {
		match self {
			Self::Module(err) => err.clone(),
			Self::BadOrigin => ModuleError::new("system", "BadOrigin", "Bad origin"),
			Self::Other(msg) => ModuleError::new("system", "Other", msg.clone()),
		}
	}
}

impl fmt::Display for DispatchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Module(err) => write!(f, "{}", err),
			Self::BadOrigin => write!(f, "BadOrigin"),
			Self::Other(msg) => write!(f, "{}", msg),
		}
	}
}

/// Chain events the scheduler understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
	ExtrinsicSuccess,
	ExtrinsicFailed {
		error: DispatchError,
	},
	BatchCompleted,
	BatchInterrupted {
		index: u32,
		error: DispatchError,
	},
	TaskScheduled {
		who: Account,
		task_id: TaskId,
	},
	TaskTriggered {
		who: Account,
		task_id: TaskId,
	},
	TaskExecuted {
		who: Account,
		task_id: TaskId,
	},
	TaskCancelled {
		who: Account,
		task_id: TaskId,
	},
	XcmpMessageSent {
		message_hash: H256,
	},
	XcmpSuccess {
		message_hash: H256,
	},
	XcmpFail {
		message_hash: H256,
		error: String,
	},
	ProxyExecuted {
		result: Result<(), DispatchError>,
	},
	ProxyAdded {
		delegator: Account,
		delegatee: Account,
		proxy_type: ProxyType,
		delay: u32,
	},
	Transfer {
		from: Account,
		to: Account,
		amount: u128,
	},
	Other {
		section: String,
		method: String,
	},
}

impl ChainEvent {
	pub fn section(&self) -> &str {
		match self {
			Self::ExtrinsicSuccess | Self::ExtrinsicFailed { .. } => "system",
			Self::BatchCompleted | Self::BatchInterrupted { .. } => "utility",
			Self::TaskScheduled { .. }
			| Self::TaskTriggered { .. }
			| Self::TaskExecuted { .. }
			| Self::TaskCancelled { .. } => "automationPrice",
			Self::XcmpMessageSent { .. } | Self::XcmpSuccess { .. } | Self::XcmpFail { .. } => {
				"xcmpQueue"
			}
			Self::ProxyExecuted { .. } | Self::ProxyAdded { .. } => "proxy",
			Self::Transfer { .. } => "balances",
			Self::Other { section, .. } => section,
		}
	}

	pub fn method(&self) -> &str {
		match self {
			Self::ExtrinsicSuccess => "ExtrinsicSuccess",
			Self::ExtrinsicFailed { .. } => "ExtrinsicFailed",
			Self::BatchCompleted => "BatchCompleted",
			Self::BatchInterrupted { .. } => "BatchInterrupted",
			Self::TaskScheduled { .. } => "TaskScheduled",
			Self::TaskTriggered { .. } => "TaskTriggered",
			Self::TaskExecuted { .. } => "TaskExecuted",
			Self::TaskCancelled { .. } => "TaskCancelled",
			Self::XcmpMessageSent { .. } => "XcmpMessageSent",
			Self::XcmpSuccess { .. } => "Success",
			Self::XcmpFail { .. } => "Fail",
			Self::ProxyExecuted { .. } => "ProxyExecuted",
			Self::ProxyAdded { .. } => "ProxyAdded",
			Self::Transfer { .. } => "Transfer",
			Self::Other { method, .. } => method,
		}
	}

	pub fn is(&self, section: &str, method: &str) -> bool {
		self.section() == section && self.method() == method
	}

	pub fn task_id(&self) -> Option<&TaskId> {
		match self {
			Self::TaskScheduled { task_id, .. }
			| Self::TaskTriggered { task_id, .. }
			| Self::TaskExecuted { task_id, .. }
			| Self::TaskCancelled { task_id, .. } => Some(task_id),
			_ => None,
		}
	}

	pub fn who(&self) -> Option<&Account> {
		match self {
			Self::TaskScheduled { who, .. }
			| Self::TaskTriggered { who, .. }
			| Self::TaskExecuted { who, .. }
			| Self::TaskCancelled { who, .. } => Some(who),
			_ => None,
		}
	}

	pub fn message_hash(&self) -> Option<&H256> {
		match self {
			Self::XcmpMessageSent { message_hash }
			| Self::XcmpSuccess { message_hash }
			| Self::XcmpFail { message_hash, .. } => Some(message_hash),
			_ => None,
		}
	}
}

impl fmt::Display for ChainEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.section(), self.method())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
	pub phase: Phase,
	pub event: ChainEvent,
}

impl EventRecord {
	pub fn new(phase: Phase, event: ChainEvent) -> Self {
		Self { phase, event }
	}
}

/// All events of one block, in emission order.
pub type EventBatch = Vec<EventRecord>;

/// Events published by the scheduler for observers.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
	ProvisioningPlanned {
		chain: String,
		owner: Account,
		calls: usize,
	},
	BatchSubmitted {
		chain: String,
		calls: usize,
	},
	BatchInBlock {
		chain: String,
		block_hash: H256,
	},
	BatchFinalized {
		chain: String,
		block_hash: H256,
	},
	DispatchFailed {
		chain: String,
		error: ModuleError,
	},
	TaskScheduled {
		task_id: TaskId,
	},
	StageObserved {
		task_id: TaskId,
		stage: String,
	},
	StageNotObserved {
		task_id: TaskId,
		stage: String,
	},
}

/// Broadcast bus for `SchedulerEvent`s.
///
/// Publishing never blocks; subscribers that lag behind the channel capacity
/// miss the oldest events.
pub struct EventBus {
	sender: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
		self.sender.subscribe()
	}

	/// Fails only when nobody is subscribed, which callers may ignore.
	pub fn publish(
		&self,
		event: SchedulerEvent,
	) -> Result<(), broadcast::error::SendError<SchedulerEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_event_keys_and_accessors() {
		let event = ChainEvent::TaskTriggered {
			who: Account::Key20([1u8; 20]),
			task_id: TaskId::new("9"),
		};
		assert!(event.is("automationPrice", "TaskTriggered"));
		assert_eq!(event.task_id(), Some(&TaskId::new("9")));
		assert_eq!(event.message_hash(), None);

		let success = ChainEvent::XcmpSuccess {
			message_hash: H256([2u8; 32]),
		};
		assert_eq!(success.to_string(), "xcmpQueue.Success");

		let other = ChainEvent::Other {
			section: "timestamp".into(),
			method: "Set".into(),
		};
		assert!(other.is("timestamp", "Set"));
	}

	#[test]
	fn test_dispatch_error_to_module_error() {
		let err = DispatchError::Module(ModuleError::new(
			"balances",
			"InsufficientBalance",
			"Balance too low to send value.",
		));
		assert_eq!(
			err.to_module_error().to_string(),
			"balances.InsufficientBalance: Balance too low to send value."
		);
		assert_eq!(DispatchError::BadOrigin.to_module_error().method, "BadOrigin");
	}

	#[tokio::test]
	async fn test_event_bus_delivers_to_subscribers() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		bus.publish(SchedulerEvent::TaskScheduled {
			task_id: TaskId::new("1"),
		})
		.unwrap();
		match rx.recv().await.unwrap() {
			SchedulerEvent::TaskScheduled { task_id } => assert_eq!(task_id.as_str(), "1"),
			other => panic!("unexpected event {:?}", other),
		}
	}
}

//! Task signals from the control chain.
//!
//! `TaskMonitor::watch` subscribes to events first and reads the task
//! snapshot second, so a task scheduled in between shows up in at least one
//! of them. Optionally the snapshot is re-read on an interval.

use crate::subscription::ScopedSubscription;
use futures::Stream;
use scheduler_types::{Account, ChainClientExt, ChainError, ChainEvent, ChainHandle, EventBatch, Task, TaskId};
use std::pin::Pin;
use tokio::time::{interval_at, Duration, Instant, Interval};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSignal {
	/// Every task currently stored on chain.
	Snapshot(Vec<Task>),
	Scheduled { task_id: TaskId, who: Account },
	Triggered { task_id: TaskId },
	Executed { task_id: TaskId },
	Cancelled { task_id: TaskId },
}

impl TaskSignal {
	pub fn from_event(event: &ChainEvent) -> Option<Self> {
		match event {
			ChainEvent::TaskScheduled { who, task_id } => Some(Self::Scheduled {
				task_id: task_id.clone(),
				who: *who,
			}),
			ChainEvent::TaskTriggered { task_id, .. } => Some(Self::Triggered {
				task_id: task_id.clone(),
			}),
			ChainEvent::TaskExecuted { task_id, .. } => Some(Self::Executed {
				task_id: task_id.clone(),
			}),
			ChainEvent::TaskCancelled { task_id, .. } => Some(Self::Cancelled {
				task_id: task_id.clone(),
			}),
			_ => None,
		}
	}
}

pub type TaskSignalStream = Pin<Box<dyn Stream<Item = TaskSignal> + Send>>;

enum Wake {
	Events(Option<EventBatch>),
	Resync,
}

async fn tick(ticker: &mut Option<Interval>) {
	match ticker {
		Some(ticker) => {
			ticker.tick().await;
		}
		None => std::future::pending().await,
	}
}

pub struct TaskMonitor {
	chain: ChainHandle,
	resync_interval: Option<Duration>,
}

impl TaskMonitor {
	pub fn new(chain: ChainHandle) -> Self {
		Self {
			chain,
			resync_interval: None,
		}
	}

	pub fn with_resync_interval(mut self, interval: Duration) -> Self {
		self.resync_interval = Some(interval);
		self
	}

	/// The stream starts with a `Snapshot` and ends when the chain's event
	/// stream ends. Dropping it releases the subscription.
	pub async fn watch(&self) -> Result<TaskSignalStream, ChainError> {
		let mut subscription = ScopedSubscription::open(self.chain.clone()).await?;
		let snapshot = self.chain.tasks().await?;
		info!(
			chain = %self.chain.name(),
			tasks = snapshot.len(),
			"Watching tasks"
		);

		let chain = self.chain.clone();
		let mut ticker = self
			.resync_interval
			.map(|period| interval_at(Instant::now() + period, period));

		let stream = async_stream::stream! {
			yield TaskSignal::Snapshot(snapshot);

			loop {
				let wake = tokio::select! {
					events = subscription.next_batch() => Wake::Events(events),
					_ = tick(&mut ticker) => Wake::Resync,
				};

				match wake {
					Wake::Events(Some(events)) => {
						for record in events {
							if let Some(signal) = TaskSignal::from_event(&record.event) {
								debug!(chain = %chain.name(), ?signal, "Task signal");
								yield signal;
							}
						}
					}
					Wake::Events(None) => {
						info!(chain = %chain.name(), "Task event stream ended");
						break;
					}
					Wake::Resync => match chain.tasks().await {
						Ok(tasks) => {
							yield TaskSignal::Snapshot(tasks);
						}
						Err(e) => {
							warn!(chain = %chain.name(), error = %e, "Task resync failed");
						}
					},
				}
			}
		};

		Ok(Box::pin(stream))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;
	use scheduler_chains::InMemoryChain;
	use scheduler_types::xcm::{v3::MultiLocation, VersionedMultiLocation};
	use scheduler_types::{
		AccountFormat, AssetPair, AssetPayment, TaskAction, TriggerFunction, Weight,
	};
	use std::sync::Arc;

	const OWNER: Account = Account::Id32([6u8; 32]);

	fn task(id: &str) -> Task {
		let location = VersionedMultiLocation::V3(MultiLocation::sibling(2000));
		Task {
			task_id: TaskId::new(id),
			owner: OWNER,
			chain: "shibuya".into(),
			exchange: "arthswap".into(),
			asset_pair: AssetPair::new("WRSTR", "USDT"),
			expired_at: 0,
			trigger_function: TriggerFunction::GreaterThan,
			trigger_params: vec![100],
			action: TaskAction {
				destination: location.clone(),
				schedule_fee: location.clone(),
				execution_fee: AssetPayment {
					asset_location: location,
					amount: 1,
				},
				encoded_call: vec![],
				encoded_call_weight: Weight::zero(),
				overall_weight: Weight::zero(),
				schedule_as: Some(OWNER),
			},
		}
	}

	#[tokio::test]
	async fn test_snapshot_then_events() {
		let chain = Arc::new(InMemoryChain::new("turing", 2114, AccountFormat::AccountId32));
		chain.insert_task(task("1"));

		let mut signals = TaskMonitor::new(chain.clone()).watch().await.unwrap();
		match signals.next().await.unwrap() {
			TaskSignal::Snapshot(tasks) => assert_eq!(tasks.len(), 1),
			other => panic!("unexpected signal {:?}", other),
		}

		chain.emit(vec![
			ChainEvent::ExtrinsicSuccess,
			ChainEvent::TaskCancelled {
				who: OWNER,
				task_id: TaskId::new("1"),
			},
		]);
		assert_eq!(
			signals.next().await.unwrap(),
			TaskSignal::Cancelled {
				task_id: TaskId::new("1")
			}
		);

		drop(signals);
		assert_eq!(chain.active_subscriptions(), 0);
	}

	#[tokio::test]
	async fn test_periodic_resync() {
		let chain = Arc::new(InMemoryChain::new("turing", 2114, AccountFormat::AccountId32));
		let mut signals = TaskMonitor::new(chain.clone())
			.with_resync_interval(Duration::from_millis(20))
			.watch()
			.await
			.unwrap();
		assert_eq!(signals.next().await.unwrap(), TaskSignal::Snapshot(vec![]));

		chain.insert_task(task("2"));
		match signals.next().await.unwrap() {
			TaskSignal::Snapshot(tasks) => assert_eq!(tasks[0].task_id, TaskId::new("2")),
			other => panic!("unexpected signal {:?}", other),
		}
	}
}

//! Per-task status, merged from storage snapshots and task events.
//!
//! A snapshot only introduces tasks; it never changes the status of a task
//! that is already known. Events move a task forward through
//! `Scheduled -> Triggered -> Completed`, or to `Cancelled`, and a task in a
//! terminal status never moves again. Cancelling locally changes nothing: the
//! task becomes `Cancelled` when the chain says so.

use scheduler_discovery::TaskSignal;
use scheduler_types::{Account, Task, TaskId, TaskStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskEntry {
	pub task_id: TaskId,
	pub status: TaskStatus,
	pub owner: Option<Account>,
	/// Stored task, once a snapshot has included it.
	pub task: Option<Task>,
}

impl TaskEntry {
	fn new(task_id: TaskId, status: TaskStatus) -> Self {
		Self {
			task_id,
			status,
			owner: None,
			task: None,
		}
	}
}

pub type TaskMap = BTreeMap<TaskId, TaskEntry>;

pub struct TaskReconciler {
	state: watch::Sender<TaskMap>,
}

impl Default for TaskReconciler {
	fn default() -> Self {
		Self::new()
	}
}

impl TaskReconciler {
	pub fn new() -> Self {
		let (state, _) = watch::channel(TaskMap::new());
		Self { state }
	}

	/// Applies one signal. Returns whether anything changed; subscribers are
	/// only woken when it did.
	pub fn apply(&self, signal: TaskSignal) -> bool {
		self.state.send_if_modified(|tasks| match signal {
			TaskSignal::Snapshot(snapshot) => merge_snapshot(tasks, snapshot),
			TaskSignal::Scheduled { task_id, who } => match tasks.get_mut(&task_id) {
				Some(entry) if entry.owner == Some(who) => false,
				Some(entry) => {
					entry.owner = Some(who);
					true
				}
				None => {
					let mut entry = TaskEntry::new(task_id.clone(), TaskStatus::Scheduled);
					entry.owner = Some(who);
					tasks.insert(task_id, entry);
					true
				}
			},
			TaskSignal::Triggered { task_id } => advance(tasks, task_id, TaskStatus::Triggered),
			TaskSignal::Executed { task_id } => advance(tasks, task_id, TaskStatus::Completed),
			TaskSignal::Cancelled { task_id } => advance(tasks, task_id, TaskStatus::Cancelled),
		})
	}

	pub fn snapshot(&self) -> TaskMap {
		self.state.borrow().clone()
	}

	pub fn status(&self, task_id: &TaskId) -> Option<TaskStatus> {
		self.state.borrow().get(task_id).map(|entry| entry.status)
	}

	/// Receiver of the whole map, notified on every change.
	pub fn subscribe(&self) -> watch::Receiver<TaskMap> {
		self.state.subscribe()
	}
}

fn merge_snapshot(tasks: &mut TaskMap, snapshot: Vec<Task>) -> bool {
	let mut changed = false;
	for task in snapshot {
		match tasks.get_mut(&task.task_id) {
			Some(entry) if entry.status.is_terminal() => {
				debug!(task_id = %task.task_id, status = %entry.status, "Ignoring stale snapshot entry");
			}
			Some(entry) => {
				if entry.task.as_ref() != Some(&task) {
					entry.owner = Some(task.owner);
					entry.task = Some(task);
					changed = true;
				}
			}
			None => {
				let mut entry = TaskEntry::new(task.task_id.clone(), TaskStatus::Scheduled);
				entry.owner = Some(task.owner);
				entry.task = Some(task);
				tasks.insert(entry.task_id.clone(), entry);
				changed = true;
			}
		}
	}
	changed
}

fn advance(tasks: &mut TaskMap, task_id: TaskId, next: TaskStatus) -> bool {
	match tasks.get_mut(&task_id) {
		Some(entry) if entry.status.can_transition_to(next) => {
			debug!(%task_id, from = %entry.status, to = %next, "Task status changed");
			entry.status = next;
			true
		}
		Some(entry) => {
			debug!(%task_id, status = %entry.status, ignored = %next, "Ignoring backward transition");
			false
		}
		None => {
			debug!(%task_id, status = %next, "First sight of task");
			tasks.insert(task_id.clone(), TaskEntry::new(task_id, next));
			true
		}
	}
}

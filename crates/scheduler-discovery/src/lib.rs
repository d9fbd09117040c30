//! Event discovery for the scheduler.
//!
//! Everything here watches chains rather than changing them: scoped event
//! subscriptions, bounded waits for a single event, the task signal stream
//! of the control chain, and tracking of a task's execution across both
//! chains.

pub mod correlator;
pub mod monitor;
pub mod subscription;
pub mod tracker;

pub use correlator::{
	CancelHandle, CorrelationOutcome, EventCorrelator, EventFilter, MatchedEvent, PendingWait,
};
pub use monitor::{TaskMonitor, TaskSignal, TaskSignalStream};
pub use subscription::ScopedSubscription;
pub use tracker::{
	ExecutedStage, ExecutionReport, ExecutionStage, ExecutionTracker, StageTimeouts, TriggeredStage,
	Tracking,
};

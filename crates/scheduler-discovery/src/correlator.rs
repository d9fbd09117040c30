//! Bounded waits for a chain event.
//!
//! A wait goes `Idle -> Subscribed -> {Matched, TimedOut, Cancelled}` and is
//! single-use. Each wait owns its own subscription, opened by
//! `EventCorrelator::subscribe` and released when the wait finishes however it
//! finishes. Subscribing before the action that causes the event means the
//! event cannot slip past.
//!
//! Not seeing an event within the budget is a normal result
//! (`CorrelationOutcome::TimedOut`), not an error. It says nothing about
//! whether the event will still happen.

use crate::subscription::ScopedSubscription;
use scheduler_types::{Account, ChainError, ChainEvent, ChainHandle, EventBatch, EventRecord, TaskId, H256};
use std::fmt;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

type Predicate = Arc<dyn Fn(&ChainEvent) -> bool + Send + Sync>;

/// Matches events by `(section, method)` and optional field predicates, all
/// of which must hold.
#[derive(Clone)]
pub struct EventFilter {
	section: String,
	methods: Vec<String>,
	predicates: Vec<Predicate>,
}

impl EventFilter {
	pub fn new(section: impl Into<String>, method: impl Into<String>) -> Self {
		Self {
			section: section.into(),
			methods: vec![method.into()],
			predicates: Vec::new(),
		}
	}

	/// Also accept `method` in the same section.
	pub fn or_method(mut self, method: impl Into<String>) -> Self {
		self.methods.push(method.into());
		self
	}

	pub fn with_predicate<F>(mut self, predicate: F) -> Self
	where
		F: Fn(&ChainEvent) -> bool + Send + Sync + 'static,
	{
		self.predicates.push(Arc::new(predicate));
		self
	}

	pub fn task_id(self, task_id: TaskId) -> Self {
		self.with_predicate(move |event| event.task_id() == Some(&task_id))
	}

	pub fn message_hash(self, hash: H256) -> Self {
		self.with_predicate(move |event| event.message_hash() == Some(&hash))
	}

	pub fn who(self, account: Account) -> Self {
		self.with_predicate(move |event| event.who() == Some(&account))
	}

	pub fn matches(&self, event: &ChainEvent) -> bool {
		event.section() == self.section
			&& self.methods.iter().any(|m| m == event.method())
			&& self.predicates.iter().all(|p| p(event))
	}
}

impl fmt::Debug for EventFilter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.section, self.methods.join("|"))?;
		if !self.predicates.is_empty() {
			write!(f, " (+{} predicates)", self.predicates.len())?;
		}
		Ok(())
	}
}

/// The matching event and the rest of its block.
#[derive(Debug, Clone)]
pub struct MatchedEvent {
	pub events: EventBatch,
	pub index: usize,
}

impl MatchedEvent {
	pub fn event(&self) -> &ChainEvent {
		&self.events[self.index].event
	}

	/// Events emitted before the match in the same block.
	pub fn preceding(&self) -> &[EventRecord] {
		&self.events[..self.index]
	}

	/// Events emitted after the match in the same block.
	pub fn following(&self) -> &[EventRecord] {
		&self.events[self.index + 1..]
	}
}

#[derive(Debug, Clone)]
pub enum CorrelationOutcome {
	Matched(MatchedEvent),
	/// Not observed within the budget.
	TimedOut,
	/// Abandoned through a `CancelHandle`.
	Cancelled,
}

impl CorrelationOutcome {
	pub fn into_match(self) -> Option<MatchedEvent> {
		match self {
			Self::Matched(matched) => Some(matched),
			_ => None,
		}
	}

	pub fn is_matched(&self) -> bool {
		matches!(self, Self::Matched(_))
	}
}

/// Cancels a `PendingWait` from elsewhere, for example when its consumer
/// goes away. Cancelling before the wait starts also counts.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<Notify>);

impl CancelHandle {
	pub fn cancel(&self) {
		self.0.notify_one();
	}
}

/// A subscribed wait that has not been awaited yet.
pub struct PendingWait {
	subscription: ScopedSubscription,
	filter: EventFilter,
	timeout: Option<Duration>,
	cancel: CancelHandle,
}

impl PendingWait {
	/// Waits on an already open subscription.
	pub fn new(subscription: ScopedSubscription, filter: EventFilter, timeout: Option<Duration>) -> Self {
		Self {
			subscription,
			filter,
			timeout,
			cancel: CancelHandle::default(),
		}
	}

	/// Extra predicate, for fields only known after subscribing.
	pub fn with_predicate<F>(mut self, predicate: F) -> Self
	where
		F: Fn(&ChainEvent) -> bool + Send + Sync + 'static,
	{
		self.filter = self.filter.with_predicate(predicate);
		self
	}

	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn cancel_handle(&self) -> CancelHandle {
		self.cancel.clone()
	}

	/// Resolves once: first match, timeout, or cancellation. The subscription
	/// is released before this returns.
	pub async fn wait(self) -> CorrelationOutcome {
		let Self {
			mut subscription,
			filter,
			timeout,
			cancel,
		} = self;
		let chain = subscription.chain().name().to_string();

		let deadline = async {
			match timeout {
				Some(timeout) => tokio::time::sleep(timeout).await,
				None => future::pending().await,
			}
		};

		let outcome = tokio::select! {
			biased;
			_ = cancel.0.notified() => CorrelationOutcome::Cancelled,
			_ = deadline => CorrelationOutcome::TimedOut,
			found = scan(&mut subscription, &filter) => match found {
				Some(matched) => CorrelationOutcome::Matched(matched),
				None => {
					warn!(%chain, ?filter, "Event stream ended while waiting");
					CorrelationOutcome::TimedOut
				}
			},
		};
		drop(subscription);

		match &outcome {
			CorrelationOutcome::Matched(matched) => {
				debug!(%chain, ?filter, event = %matched.event(), "Event matched")
			}
			CorrelationOutcome::TimedOut => debug!(%chain, ?filter, "Event not observed in time"),
			CorrelationOutcome::Cancelled => debug!(%chain, ?filter, "Wait cancelled"),
		}
		outcome
	}
}

async fn scan(subscription: &mut ScopedSubscription, filter: &EventFilter) -> Option<MatchedEvent> {
	while let Some(events) = subscription.next_batch().await {
		if let Some(index) = events.iter().position(|record| filter.matches(&record.event)) {
			return Some(MatchedEvent { events, index });
		}
	}
	None
}

/// Opens waits on one chain.
#[derive(Clone)]
pub struct EventCorrelator {
	chain: ChainHandle,
	timeout: Option<Duration>,
}

impl EventCorrelator {
	/// Waits are unbounded unless a timeout is set.
	pub fn new(chain: ChainHandle) -> Self {
		Self {
			chain,
			timeout: None,
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	pub fn chain(&self) -> &ChainHandle {
		&self.chain
	}

	/// Subscribes now; the returned wait sees every block from here on.
	pub async fn subscribe(&self, filter: EventFilter) -> Result<PendingWait, ChainError> {
		let subscription = ScopedSubscription::open(self.chain.clone()).await?;
		Ok(PendingWait::new(subscription, filter, self.timeout))
	}

	/// Subscribes and waits. `timeout` overrides the correlator's default.
	pub async fn wait_for(
		&self,
		filter: EventFilter,
		timeout: Option<Duration>,
	) -> Result<CorrelationOutcome, ChainError> {
		let pending = self.subscribe(filter).await?;
		let timeout = timeout.or(self.timeout);
		Ok(pending.with_timeout(timeout).wait().await)
	}
}

//! Event subscriptions that release themselves.

use futures::StreamExt;
use scheduler_types::{ChainError, ChainHandle, EventBatch, EventStream, SubscriptionId};
use tracing::debug;

/// An open event subscription on one chain.
///
/// Dropping it unsubscribes, so a wait that ends early through timeout,
/// cancellation or an error cannot leave a listener behind.
pub struct ScopedSubscription {
	chain: ChainHandle,
	id: SubscriptionId,
	stream: EventStream,
}

impl ScopedSubscription {
	pub async fn open(chain: ChainHandle) -> Result<Self, ChainError> {
		let subscription = chain.subscribe_events().await?;
		debug!(chain = %chain.name(), subscription = %subscription.id, "Subscription opened");
		Ok(Self {
			chain,
			id: subscription.id,
			stream: subscription.stream,
		})
	}

	pub fn id(&self) -> SubscriptionId {
		self.id
	}

	pub fn chain(&self) -> &ChainHandle {
		&self.chain
	}

	/// Next block's events, or `None` once the chain ends the stream.
	pub async fn next_batch(&mut self) -> Option<EventBatch> {
		self.stream.next().await
	}
}

impl Drop for ScopedSubscription {
	fn drop(&mut self) {
		self.chain.unsubscribe(self.id);
		debug!(chain = %self.chain.name(), subscription = %self.id, "Subscription released");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use scheduler_chains::InMemoryChain;
	use scheduler_types::{AccountFormat, ChainEvent};
	use std::sync::Arc;

	#[tokio::test]
	async fn test_drop_unsubscribes() {
		let chain = Arc::new(InMemoryChain::new("turing", 2114, AccountFormat::AccountId32));
		let mut subscription = ScopedSubscription::open(chain.clone()).await.unwrap();
		assert_eq!(chain.active_subscriptions(), 1);

		chain.emit(vec![ChainEvent::ExtrinsicSuccess]);
		assert_eq!(subscription.next_batch().await.unwrap().len(), 1);

		drop(subscription);
		assert_eq!(chain.active_subscriptions(), 0);
	}
}

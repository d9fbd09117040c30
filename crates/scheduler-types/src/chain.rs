//! The chain client seam.
//!
//! A `ChainClient` is an explicitly constructed handle to one chain. It is
//! shared as `Arc<dyn ChainClient>` and closed explicitly; nothing in the
//! scheduler caches clients globally.

use crate::account::{Account, AccountFormat};
use crate::calls::{ProxyDefinition, RuntimeCall, SignedCall, UnsignedCall};
use crate::errors::ChainError;
use crate::events::EventBatch;
use crate::hashing::H256;
use crate::task::Task;
use crate::weight::Weight;
use crate::xcm::VersionedMultiLocation;
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// Shared handle to a chain client.
pub type ChainHandle = Arc<dyn ChainClient>;

/// Transaction status updates, in the order the chain reports them.
pub type StatusStream = Pin<Box<dyn Stream<Item = TxStatus> + Send>>;

/// One item per block: the block's events.
pub type EventStream = Pin<Box<dyn Stream<Item = EventBatch> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "sub-{}", self.0)
	}
}

/// A live event subscription. The id must be passed back to
/// `ChainClient::unsubscribe` to release it.
pub struct EventSubscription {
	pub id: SubscriptionId,
	pub stream: EventStream,
}

/// Storage reads the scheduler performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageQuery {
	/// `parachainInfo.parachainId`
	ParachainId,
	/// `system.account(who).data.free`
	FreeBalance(Account),
	/// `tokens.accounts(who, asset_id).free`
	AssetBalance { account: Account, asset_id: u32 },
	/// `proxy.proxies(who)`
	Proxies(Account),
	/// `assetRegistry.locationToAssetId(location)`
	AssetIdForLocation(VersionedMultiLocation),
	/// `assetRegistry.metadata(asset_id).additional.feePerSecond`
	AssetFeePerSecond(u32),
	/// `transactionPaymentApi.queryWeightToFee(weight)`
	WeightToFee(Weight),
	/// `automationPrice.tasks.entries()`
	Tasks,
}

impl fmt::Display for StorageQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ParachainId => write!(f, "parachainInfo.parachainId"),
			Self::FreeBalance(who) => write!(f, "system.account({})", who),
			Self::AssetBalance { account, asset_id } => {
				write!(f, "tokens.accounts({}, {})", account, asset_id)
			}
			Self::Proxies(who) => write!(f, "proxy.proxies({})", who),
			Self::AssetIdForLocation(_) => write!(f, "assetRegistry.locationToAssetId"),
			Self::AssetFeePerSecond(id) => write!(f, "assetRegistry.metadata({})", id),
			Self::WeightToFee(weight) => write!(f, "queryWeightToFee({})", weight),
			Self::Tasks => write!(f, "automationPrice.tasks"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageValue {
	ParachainId(u32),
	Balance(u128),
	Proxies(Vec<ProxyDefinition>),
	AssetId(Option<u32>),
	FeePerSecond(Option<u128>),
	Fee(u128),
	Tasks(Vec<Task>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
	Ready,
	Broadcast,
	InBlock { block_hash: H256, events: EventBatch },
	Finalized { block_hash: H256, events: EventBatch },
	Retracted,
	Dropped,
	Invalid(String),
	Usurped,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Human readable chain name, used in logs and errors.
	fn name(&self) -> &str;

	fn account_format(&self) -> AccountFormat;

	async fn query_state(&self, query: StorageQuery) -> Result<StorageValue, ChainError>;

	/// Resolves pallet and call indices for `call` and returns its encoding.
	async fn build_call(&self, call: RuntimeCall) -> Result<UnsignedCall, ChainError>;

	async fn estimate_weight(
		&self,
		call: &UnsignedCall,
		fee_payer: &Account,
	) -> Result<Weight, ChainError>;

	/// Submits a signed call. An `Err` means the node refused it outright;
	/// later rejections arrive as `TxStatus::Invalid` or `TxStatus::Dropped`.
	async fn submit(&self, call: SignedCall) -> Result<StatusStream, ChainError>;

	async fn subscribe_events(&self) -> Result<EventSubscription, ChainError>;

	/// Releases a subscription. Synchronous so it can run from `Drop`.
	fn unsubscribe(&self, id: SubscriptionId);

	async fn close(&self) -> Result<(), ChainError>;
}

/// Typed storage helpers over `ChainClient::query_state`.
#[async_trait]
pub trait ChainClientExt {
	async fn para_id(&self) -> Result<u32, ChainError>;
	async fn free_balance(&self, account: &Account) -> Result<u128, ChainError>;
	async fn asset_balance(&self, account: &Account, asset_id: u32) -> Result<u128, ChainError>;
	async fn proxies(&self, account: &Account) -> Result<Vec<ProxyDefinition>, ChainError>;
	async fn asset_id_for_location(
		&self,
		location: VersionedMultiLocation,
	) -> Result<Option<u32>, ChainError>;
	async fn fee_per_second(&self, asset_id: u32) -> Result<Option<u128>, ChainError>;
	async fn weight_to_fee(&self, weight: Weight) -> Result<u128, ChainError>;
	async fn tasks(&self) -> Result<Vec<Task>, ChainError>;
}

fn unexpected(query: &StorageQuery, found: StorageValue) -> ChainError {
	ChainError::UnexpectedValue {
		query: query.to_string(),
		found: format!("{:?}", found),
	}
}

macro_rules! typed_query {
	($client:expr, $query:expr, $pattern:pat => $value:expr) => {{
		let query = $query;
		match $client.query_state(query.clone()).await? {
			$pattern => Ok($value),
			other => Err(unexpected(&query, other)),
		}
	}};
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClientExt for T {
	async fn para_id(&self) -> Result<u32, ChainError> {
		typed_query!(self, StorageQuery::ParachainId, StorageValue::ParachainId(id) => id)
	}

	async fn free_balance(&self, account: &Account) -> Result<u128, ChainError> {
		typed_query!(self, StorageQuery::FreeBalance(*account), StorageValue::Balance(b) => b)
	}

	async fn asset_balance(&self, account: &Account, asset_id: u32) -> Result<u128, ChainError> {
		typed_query!(
			self,
			StorageQuery::AssetBalance {
				account: *account,
				asset_id
			},
			StorageValue::Balance(b) => b
		)
	}

	async fn proxies(&self, account: &Account) -> Result<Vec<ProxyDefinition>, ChainError> {
		typed_query!(self, StorageQuery::Proxies(*account), StorageValue::Proxies(p) => p)
	}

	async fn asset_id_for_location(
		&self,
		location: VersionedMultiLocation,
	) -> Result<Option<u32>, ChainError> {
		typed_query!(
			self,
			StorageQuery::AssetIdForLocation(location),
			StorageValue::AssetId(id) => id
		)
	}

	async fn fee_per_second(&self, asset_id: u32) -> Result<Option<u128>, ChainError> {
		typed_query!(
			self,
			StorageQuery::AssetFeePerSecond(asset_id),
			StorageValue::FeePerSecond(fee) => fee
		)
	}

	async fn weight_to_fee(&self, weight: Weight) -> Result<u128, ChainError> {
		typed_query!(self, StorageQuery::WeightToFee(weight), StorageValue::Fee(fee) => fee)
	}

	async fn tasks(&self) -> Result<Vec<Task>, ChainError> {
		typed_query!(self, StorageQuery::Tasks, StorageValue::Tasks(tasks) => tasks)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::account::AccountFormat;
	use futures::stream;

	/// Answers every query with a fixed value.
	struct FixedChain(StorageValue);

	#[async_trait]
	impl ChainClient for FixedChain {
		fn name(&self) -> &str {
			"fixed"
		}

		fn account_format(&self) -> AccountFormat {
			AccountFormat::AccountId32
		}

		async fn query_state(&self, _query: StorageQuery) -> Result<StorageValue, ChainError> {
			Ok(self.0.clone())
		}

		async fn build_call(&self, call: RuntimeCall) -> Result<UnsignedCall, ChainError> {
			Ok(UnsignedCall::new(call, 0, 0))
		}

		async fn estimate_weight(
			&self,
			_call: &UnsignedCall,
			_fee_payer: &Account,
		) -> Result<Weight, ChainError> {
			Ok(Weight::zero())
		}

		async fn submit(&self, _call: SignedCall) -> Result<StatusStream, ChainError> {
			Ok(Box::pin(stream::iter(vec![TxStatus::Ready])))
		}

		async fn subscribe_events(&self) -> Result<EventSubscription, ChainError> {
			Ok(EventSubscription {
				id: SubscriptionId(0),
				stream: Box::pin(stream::empty()),
			})
		}

		fn unsubscribe(&self, _id: SubscriptionId) {}

		async fn close(&self) -> Result<(), ChainError> {
			Ok(())
		}
	}

	#[tokio::test]
	async fn test_typed_query_matches_value() {
		let chain = FixedChain(StorageValue::Balance(5));
		let account = Account::Id32([0u8; 32]);
		assert_eq!(chain.free_balance(&account).await.unwrap(), 5);
	}

	#[tokio::test]
	async fn test_typed_query_rejects_mismatched_value() {
		let chain: ChainHandle = Arc::new(FixedChain(StorageValue::Balance(5)));
		let err = chain.para_id().await.unwrap_err();
		assert!(matches!(err, ChainError::UnexpectedValue { .. }));
	}
}

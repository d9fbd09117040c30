//! Provisioning of derivative accounts.
//!
//! `ProvisioningPlanner::plan` reads the current state for each requirement
//! and returns a call only for requirements that are not met yet. Planning
//! again after the calls are applied yields nothing.
//!
//! The check and the eventual submission are not atomic. Two planners working
//! for the same owner at once may both decide to provision; the calls
//! involved are cheap to repeat or fail harmlessly on chain, so no locking is
//! done here.

use scheduler_types::xcm::v3::{Junction, Junctions, MultiAsset, MultiLocation, WeightLimit};
use scheduler_types::xcm::{VersionedMultiAsset, VersionedMultiLocation};
use scheduler_types::{
	Account, ChainClient, ChainClientExt, ChainError, ChainHandle, ProxyType, Result, RuntimeCall,
	SchedulerError, UnsignedCall,
};
use std::fmt;
use tracing::{debug, info};

/// A pre-condition the owner's accounts must satisfy before scheduling.
#[derive(Clone)]
pub enum Requirement {
	/// `account` holds at least `minimum` of the planning chain's native
	/// asset. Topped up by a transfer of exactly `minimum`.
	MinimumBalance { account: Account, minimum: u128 },
	/// The owner has granted `delegate` a proxy of `proxy_type`.
	ProxyAuthorization {
		delegate: Account,
		proxy_type: ProxyType,
	},
	/// On `remote`, `account` holds at least `minimum` of the planning chain's
	/// native asset. Topped up by a cross-chain transfer of exactly `minimum`.
	MinimumRemoteAssetBalance {
		remote: ChainHandle,
		account: Account,
		minimum: u128,
	},
}

impl fmt::Debug for Requirement {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::MinimumBalance { account, minimum } => f
				.debug_struct("MinimumBalance")
				.field("account", account)
				.field("minimum", minimum)
				.finish(),
			Self::ProxyAuthorization {
				delegate,
				proxy_type,
			} => f
				.debug_struct("ProxyAuthorization")
				.field("delegate", delegate)
				.field("proxy_type", proxy_type)
				.finish(),
			Self::MinimumRemoteAssetBalance {
				remote,
				account,
				minimum,
			} => f
				.debug_struct("MinimumRemoteAssetBalance")
				.field("remote", &remote.name())
				.field("account", account)
				.field("minimum", minimum)
				.finish(),
		}
	}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProvisioningPlanner;

fn query_failed(chain: &dyn ChainClient) -> impl FnOnce(ChainError) -> SchedulerError + '_ {
	move |source| SchedulerError::ProvisioningQueryFailed {
		chain: chain.name().to_string(),
		source,
	}
}

impl ProvisioningPlanner {
	pub fn new() -> Self {
		Self
	}

	/// Calls to submit on `chain`, signed by `owner`, so that every
	/// requirement holds. Balances exactly at the minimum are sufficient.
	pub async fn plan(
		&self,
		owner: &Account,
		chain: &ChainHandle,
		requirements: &[Requirement],
	) -> Result<Vec<UnsignedCall>> {
		let mut calls = Vec::new();

		for requirement in requirements {
			let call = match requirement {
				Requirement::MinimumBalance { account, minimum } => {
					self.plan_balance(chain, account, *minimum).await?
				}
				Requirement::ProxyAuthorization {
					delegate,
					proxy_type,
				} => self.plan_proxy(chain, owner, delegate, *proxy_type).await?,
				Requirement::MinimumRemoteAssetBalance {
					remote,
					account,
					minimum,
				} => {
					self.plan_remote_asset(chain, remote, account, *minimum)
						.await?
				}
			};

			match call {
				Some(call) => {
					debug!(chain = %chain.name(), call = %call.method(), ?requirement, "Requirement not met");
					calls.push(chain.build_call(call).await?);
				}
				None => debug!(chain = %chain.name(), ?requirement, "Requirement already met"),
			}
		}

		info!(
			chain = %chain.name(),
			owner = %owner,
			calls = calls.len(),
			"Provisioning planned"
		);
		Ok(calls)
	}

	async fn plan_balance(
		&self,
		chain: &ChainHandle,
		account: &Account,
		minimum: u128,
	) -> Result<Option<RuntimeCall>> {
		let balance = chain
			.free_balance(account)
			.await
			.map_err(query_failed(chain.as_ref()))?;
		if balance < minimum {
			return Ok(Some(RuntimeCall::Transfer {
				dest: *account,
				value: minimum,
			}));
		}
		Ok(None)
	}

	async fn plan_proxy(
		&self,
		chain: &ChainHandle,
		owner: &Account,
		delegate: &Account,
		proxy_type: ProxyType,
	) -> Result<Option<RuntimeCall>> {
		let proxies = chain
			.proxies(owner)
			.await
			.map_err(query_failed(chain.as_ref()))?;
		if proxies
			.iter()
			.any(|p| p.delegate == *delegate && p.proxy_type == proxy_type)
		{
			return Ok(None);
		}
		Ok(Some(RuntimeCall::AddProxy {
			delegate: *delegate,
			proxy_type,
			delay: 0,
		}))
	}

	async fn plan_remote_asset(
		&self,
		chain: &ChainHandle,
		remote: &ChainHandle,
		account: &Account,
		minimum: u128,
	) -> Result<Option<RuntimeCall>> {
		let local_para = chain.para_id().await.map_err(query_failed(chain.as_ref()))?;
		let location = VersionedMultiLocation::V3(MultiLocation::sibling(local_para));
		let asset_id = remote
			.asset_id_for_location(location)
			.await
			.map_err(query_failed(remote.as_ref()))?
			.ok_or_else(|| SchedulerError::UnknownAsset {
				chain: remote.name().to_string(),
				asset: format!("native asset of parachain {}", local_para),
			})?;
		let balance = remote
			.asset_balance(account, asset_id)
			.await
			.map_err(query_failed(remote.as_ref()))?;
		if balance >= minimum {
			return Ok(None);
		}

		let remote_para = remote.para_id().await.map_err(query_failed(remote.as_ref()))?;
		let beneficiary = match account {
			Account::Id32(id) => Junction::AccountId32 {
				network: None,
				id: *id,
			},
			Account::Key20(key) => Junction::AccountKey20 {
				network: None,
				key: *key,
			},
		};
		Ok(Some(RuntimeCall::TransferMultiasset {
			asset: VersionedMultiAsset::V3(MultiAsset::fungible(MultiLocation::here(), minimum)),
			dest: VersionedMultiLocation::V3(MultiLocation {
				parents: 1,
				interior: Junctions::X2(Junction::Parachain(remote_para), beneficiary),
			}),
			dest_weight_limit: WeightLimit::Unlimited,
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;
	use scheduler_chains::InMemoryChain;
	use scheduler_types::{AccountFormat, ProxyDefinition, Signature, SignedCall};
	use std::sync::Arc;

	const OWNER: Account = Account::Id32([1u8; 32]);
	const EXEC_DERIVATIVE: Account = Account::Id32([2u8; 32]);
	const CONTROL_DERIVATIVE: Account = Account::Id32([3u8; 32]);

	struct Fixture {
		execution: Arc<InMemoryChain>,
		control: Arc<InMemoryChain>,
	}

	impl Fixture {
		fn new() -> Self {
			let execution = Arc::new(InMemoryChain::new("shibuya", 2000, AccountFormat::AccountId32));
			let control = Arc::new(InMemoryChain::new("turing", 2114, AccountFormat::AccountId32));
			execution.connect(&control);
			control.register_asset(VersionedMultiLocation::V3(MultiLocation::sibling(2000)), 5, 1);
			execution.set_balance(OWNER, 1_000_000);
			Self { execution, control }
		}

		fn handle(&self) -> ChainHandle {
			self.execution.clone()
		}

		fn requirements(&self) -> Vec<Requirement> {
			vec![
				Requirement::ProxyAuthorization {
					delegate: EXEC_DERIVATIVE,
					proxy_type: ProxyType::Any,
				},
				Requirement::MinimumBalance {
					account: EXEC_DERIVATIVE,
					minimum: 1_000,
				},
				Requirement::MinimumRemoteAssetBalance {
					remote: self.control.clone(),
					account: CONTROL_DERIVATIVE,
					minimum: 5_000,
				},
			]
		}

		async fn apply(&self, calls: Vec<UnsignedCall>) {
			let batch = self
				.execution
				.build_call(RuntimeCall::Batch { calls })
				.await
				.unwrap();
			let statuses: Vec<_> = self
				.execution
				.submit(SignedCall {
					call: batch,
					signer: OWNER,
					signature: Signature(vec![]),
				})
				.await
				.unwrap()
				.collect()
				.await;
			assert!(!statuses.is_empty());
		}
	}

	#[tokio::test]
	async fn test_plan_emits_calls_for_unmet_requirements() {
		let fixture = Fixture::new();
		let calls = ProvisioningPlanner::new()
			.plan(&OWNER, &fixture.handle(), &fixture.requirements())
			.await
			.unwrap();

		let methods: Vec<String> = calls.iter().map(|c| c.method.to_string()).collect();
		assert_eq!(
			methods,
			vec!["proxy.addProxy", "balances.transfer", "xtokens.transferMultiasset"]
		);
		assert!(matches!(
			calls[1].call,
			RuntimeCall::Transfer {
				dest: EXEC_DERIVATIVE,
				value: 1_000
			}
		));
	}

	#[tokio::test]
	async fn test_plan_is_idempotent_once_applied() {
		let fixture = Fixture::new();
		let planner = ProvisioningPlanner::new();
		let calls = planner
			.plan(&OWNER, &fixture.handle(), &fixture.requirements())
			.await
			.unwrap();
		fixture.apply(calls).await;

		assert_eq!(fixture.control.asset_balance_of(&CONTROL_DERIVATIVE, 5), 5_000);
		let again = planner
			.plan(&OWNER, &fixture.handle(), &fixture.requirements())
			.await
			.unwrap();
		assert!(again.is_empty());
	}

	#[tokio::test]
	async fn test_balance_at_minimum_is_sufficient() {
		let fixture = Fixture::new();
		fixture.execution.set_balance(EXEC_DERIVATIVE, 1_000);
		fixture.execution.add_proxy(
			OWNER,
			ProxyDefinition {
				delegate: EXEC_DERIVATIVE,
				proxy_type: ProxyType::Any,
				delay: 0,
			},
		);
		fixture.control.set_asset_balance(CONTROL_DERIVATIVE, 5, 4_999);

		let calls = ProvisioningPlanner::new()
			.plan(&OWNER, &fixture.handle(), &fixture.requirements())
			.await
			.unwrap();
		assert_eq!(calls.len(), 1);
		assert_eq!(calls[0].method.to_string(), "xtokens.transferMultiasset");
	}

	#[tokio::test]
	async fn test_proxy_of_other_type_does_not_count() {
		let fixture = Fixture::new();
		fixture.execution.add_proxy(
			OWNER,
			ProxyDefinition {
				delegate: EXEC_DERIVATIVE,
				proxy_type: ProxyType::CancelProxy,
				delay: 0,
			},
		);
		let calls = ProvisioningPlanner::new()
			.plan(
				&OWNER,
				&fixture.handle(),
				&fixture.requirements()[..1],
			)
			.await
			.unwrap();
		assert_eq!(calls.len(), 1);
	}

	#[tokio::test]
	async fn test_query_failure_is_retryable() {
		let fixture = Fixture::new();
		fixture.control.fail_queries(Some("connection reset".into()));
		let err = ProvisioningPlanner::new()
			.plan(&OWNER, &fixture.handle(), &fixture.requirements())
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			SchedulerError::ProvisioningQueryFailed { ref chain, .. } if chain == "turing"
		));
		assert!(err.is_retryable());
	}
}

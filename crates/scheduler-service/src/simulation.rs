//! End-to-end run against two connected in-memory chains.
//!
//! The chains are built from the configured names and para ids, with origin
//! conversion matching the engine's derivations, so the run exercises
//! provisioning, assembly, submission, task sync and execution tracking
//! without a node.

use anyhow::{Context, Result};
use scheduler_account::{AccountService, LocalWallet};
use scheduler_chains::InMemoryChain;
use scheduler_config::SchedulerConfig;
use scheduler_core::{EngineBuilder, ScheduleReceipt, TaskRequest};
use scheduler_discovery::ExecutionStage;
use scheduler_types::xcm::{v3::MultiLocation, VersionedMultiLocation};
use scheduler_types::{Account, AssetPair, RuntimeCall, TaskStatus, TriggerFunction};
use scheduler_xcm::{derive_v2, derive_v3};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Asset id the control chain gives the execution chain's native token.
const EXECUTION_ASSET_ID: u32 = 1;

pub struct SimulationOptions {
	pub private_key: String,
	pub beneficiary: Account,
	pub amount: u128,
	pub asset_pair: AssetPair,
	pub trigger_function: TriggerFunction,
	pub threshold: u128,
	/// Price of one second of control chain execution, in the execution
	/// chain's token.
	pub fee_per_second: u128,
}

#[derive(Debug, Serialize)]
pub struct SimulationSummary {
	pub owner: Account,
	pub control_derivative: Account,
	pub execution_derivative: Account,
	pub receipt: ScheduleReceipt,
	pub last_stage: Option<ExecutionStage>,
	pub execution_error: Option<String>,
	pub status: Option<TaskStatus>,
	pub beneficiary_balance: u128,
}

/// Opens the execution and control chains described by `config`.
pub fn open_chains(
	config: &SchedulerConfig,
	fee_per_second: u128,
) -> (Arc<InMemoryChain>, Arc<InMemoryChain>) {
	let chains = &config.chains;
	let execution = Arc::new(InMemoryChain::new(
		&chains.execution.name,
		chains.execution.para_id,
		chains.execution.account_format,
	));
	let control = Arc::new(InMemoryChain::new(
		&chains.control.name,
		chains.control.para_id,
		chains.control.account_format,
	));
	execution.connect(&control);

	let location_version = config.derivation.location_version;
	let network = config.derivation.network;
	control.set_origin_converter(Box::new(move |para_id: u32, account: &Account| {
		derive_v2(account.as_bytes(), para_id, location_version, network).unwrap_or(*account)
	}));
	execution.set_origin_converter(Box::new(|para_id: u32, account: &Account| {
		derive_v3(account.as_bytes(), para_id, account.format()).unwrap_or(*account)
	}));

	execution.set_weight_to_fee(1, 1_000);
	control.register_asset(
		VersionedMultiLocation::V3(MultiLocation::sibling(chains.execution.para_id)),
		EXECUTION_ASSET_ID,
		fee_per_second,
	);

	(execution, control)
}

pub async fn run(config: SchedulerConfig, options: SimulationOptions) -> Result<SimulationSummary> {
	let wallet = LocalWallet::new(&options.private_key).context("Invalid private key")?;
	let owner = wallet.account();
	let signer = AccountService::new(Box::new(wallet));

	let (execution, control) = open_chains(&config, options.fee_per_second);
	let provisioning = &config.provisioning;
	let funding = provisioning
		.min_derivative_balance
		.saturating_add(provisioning.min_derivative_asset_balance)
		.saturating_mul(2)
		.saturating_add(options.amount);
	execution.set_balance(owner, funding);
	info!(%owner, funding, chain = %config.chains.execution.name, "Funded owner");

	let executed_timeout = config.correlation.executed_timeout();
	let engine = EngineBuilder::new(config)
		.with_chain(execution.clone())
		.with_chain(control.clone())
		.build()
		.await
		.context("Failed to build engine")?;

	let mut events = engine.event_bus().subscribe();
	let event_log = tokio::spawn(async move {
		while let Ok(event) = events.recv().await {
			debug!(?event, "Scheduler event");
		}
	});

	engine.start().await.context("Failed to start engine")?;
	let mut tasks = engine.watch_tasks();

	let request = TaskRequest::new(
		RuntimeCall::Transfer {
			dest: options.beneficiary,
			value: options.amount,
		},
		options.asset_pair,
		options.trigger_function,
		options.threshold,
	);
	let receipt = engine
		.schedule_task(request, &signer)
		.await
		.context("Failed to schedule task")?;

	let mut last_stage = None;
	let mut execution_error = None;
	let mut status = None;
	if let Some(task_id) = receipt.task_id.clone() {
		let tracking = engine
			.execution_tracker()
			.start(&task_id)
			.await
			.context("Failed to start execution tracking")?;
		control
			.trigger_task(&task_id)
			.context("Failed to trigger task")?;
		let report = tracking.wait().await;
		last_stage = report.last_observed();
		execution_error = report.executed.and_then(|stage| stage.error);

		let settled = tasks.wait_for(|tasks| {
			tasks
				.get(&task_id)
				.is_some_and(|entry| entry.status.is_terminal())
		});
		if timeout(executed_timeout, settled).await.is_err() {
			warn!(%task_id, "Task did not reach a terminal status");
		}
		status = engine
			.task_list()
			.into_iter()
			.find(|entry| entry.task_id == task_id)
			.map(|entry| entry.status);
	} else {
		warn!(failures = receipt.dispatch_failures.len(), "No task was scheduled");
	}

	let summary = SimulationSummary {
		owner,
		control_derivative: engine.control_derivative(&owner)?,
		execution_derivative: engine.execution_derivative(&owner)?,
		receipt,
		last_stage,
		execution_error,
		status,
		beneficiary_balance: execution.free_balance_of(&options.beneficiary),
	};

	engine.close().await.context("Failed to close engine")?;
	event_log.abort();
	Ok(summary)
}

#[cfg(test)]
mod tests {
	use super::*;
	use scheduler_config::{ConfigFormat, ConfigLoader};

	// anvil's first development key
	const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const BENEFICIARY: Account = Account::Id32([0x42; 32]);

	const CONFIG: &str = r#"
[engine]
name = "simulation-test"

[chains.execution]
name = "shibuya"
endpoint = "memory://shibuya"
para_id = 2000
account_format = "account_id32"

[chains.control]
name = "turing"
endpoint = "memory://turing"
para_id = 2114
account_format = "account_id32"

[provisioning]
min_derivative_balance = "1000000000"
min_derivative_asset_balance = "10000000000"

[correlation]
scheduled_timeout_ms = 2000
triggered_timeout_ms = 2000
executed_timeout_ms = 2000
"#;

	fn options() -> SimulationOptions {
		SimulationOptions {
			private_key: KEY.to_string(),
			beneficiary: BENEFICIARY,
			amount: 7,
			asset_pair: AssetPair::new("WRSTR", "USDT"),
			trigger_function: TriggerFunction::GreaterThan,
			threshold: 100,
			fee_per_second: 416_000_000_000,
		}
	}

	#[tokio::test]
	async fn test_simulation_completes_task() {
		let config = ConfigLoader::new().parse(CONFIG, ConfigFormat::Toml).unwrap();
		let summary = run(config, options()).await.unwrap();

		assert!(matches!(summary.owner, Account::Key20(_)));
		assert!(matches!(summary.control_derivative, Account::Id32(_)));
		assert!(matches!(summary.execution_derivative, Account::Key20(_)));
		assert!(summary.receipt.task_id.is_some());
		assert_eq!(summary.last_stage, Some(ExecutionStage::Executed));
		assert_eq!(summary.execution_error, None);
		assert_eq!(summary.status, Some(TaskStatus::Completed));
		assert_eq!(summary.beneficiary_balance, 7);
	}

	#[tokio::test]
	async fn test_simulation_rejects_bad_key() {
		let config = ConfigLoader::new().parse(CONFIG, ConfigFormat::Toml).unwrap();
		let mut options = options();
		options.private_key = "0x1234".to_string();
		assert!(run(config, options).await.is_err());
	}
}

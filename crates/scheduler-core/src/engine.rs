//! The engine facade: scheduling, cancelling and watching tasks.
//!
//! One scheduling attempt goes through these steps:
//!
//! 1. on the control chain, the owner's multilocation-hash derivative must be
//!    the owner's proxy, since it transacts the schedule call; if not, that
//!    grant is submitted and finalized on its own;
//! 2. on the execution chain, the provisioning calls for the sibling-chain
//!    derivative (proxy, minimum balance) and for the control-side derivative
//!    (minimum fee asset balance) are planned;
//! 3. the nested message is assembled;
//! 4. a wait for `TaskScheduled` is opened on the control chain;
//! 5. provisioning plus the transport call are submitted as one batch and
//!    followed to finality;
//! 6. the scheduled task id is read from the matching event.

use crate::error::CoreError;
use crate::lifecycle::{EngineState, Lifecycle};
use crate::reconciler::{TaskEntry, TaskMap, TaskReconciler};
use chrono::Utc;
use futures::StreamExt;
use scheduler_account::AccountService;
use scheduler_chains::ChainRegistry;
use scheduler_config::SchedulerConfig;
use scheduler_delivery::{BatchSubmitter, DispatchFailure, SubmissionOutcome};
use scheduler_discovery::{
	EventCorrelator, EventFilter, ExecutionReport, ExecutionTracker, StageTimeouts, TaskMonitor,
};
use scheduler_provisioning::{ProvisioningPlanner, Requirement};
use scheduler_types::xcm::v3::MultiLocation;
use scheduler_types::xcm::VersionedMultiLocation;
use scheduler_types::{
	Account, AssetPair, ChainHandle, EventBus, RuntimeCall, SchedulerEvent, TaskId,
	TriggerFunction, UnsignedCall, H256,
};
use scheduler_xcm::{
	derive, derive_v2, derive_v3, DerivationScheme, FeeDescriptor, MessageAssembler,
	ScheduleParams,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// What the owner wants scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
	/// Runs on the execution chain, as the owner, when the task triggers.
	pub call: RuntimeCall,
	pub asset_pair: AssetPair,
	pub trigger_function: TriggerFunction,
	pub trigger_params: Vec<u128>,
	/// Unix seconds. Defaults to the configured number of days from now.
	pub expired_at: Option<u64>,
}

impl TaskRequest {
	pub fn new(
		call: RuntimeCall,
		asset_pair: AssetPair,
		trigger_function: TriggerFunction,
		threshold: u128,
	) -> Self {
		Self {
			call,
			asset_pair,
			trigger_function,
			trigger_params: vec![threshold],
			expired_at: None,
		}
	}

	pub fn with_expiry(mut self, expired_at: u64) -> Self {
		self.expired_at = Some(expired_at);
		self
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReceipt {
	/// `None` when the batch failed, or when the control chain did not report
	/// the task within the scheduled timeout.
	pub task_id: Option<TaskId>,
	pub finalized: bool,
	pub block_hash: H256,
	pub dispatch_failures: Vec<DispatchFailure>,
	pub execution_fee: u128,
	pub schedule_fee: u128,
}

/// Keeps a task list callback alive. Dropping it stops the callback.
pub struct TaskListSubscription {
	handle: JoinHandle<()>,
}

impl Drop for TaskListSubscription {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

pub struct SchedulerEngine {
	pub(crate) config: SchedulerConfig,
	pub(crate) chains: Mutex<ChainRegistry>,
	pub(crate) execution: ChainHandle,
	pub(crate) control: ChainHandle,
	pub(crate) planner: ProvisioningPlanner,
	pub(crate) assembler: MessageAssembler,
	pub(crate) submitter: BatchSubmitter,
	pub(crate) reconciler: Arc<TaskReconciler>,
	pub(crate) lifecycle: Arc<Lifecycle>,
	pub(crate) event_bus: EventBus,
	pub(crate) resync_interval: Option<Duration>,
	pub(crate) sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerEngine {
	pub fn config(&self) -> &SchedulerConfig {
		&self.config
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn execution_chain(&self) -> &ChainHandle {
		&self.execution
	}

	pub fn control_chain(&self) -> &ChainHandle {
		&self.control
	}

	/// The account that transacts `owner`'s messages on the control chain.
	pub fn control_derivative(&self, owner: &Account) -> Result<Account, CoreError> {
		let derivation = &self.config.derivation;
		Ok(derive_v2(
			owner.as_bytes(),
			self.config.chains.execution.para_id,
			derivation.location_version,
			derivation.network,
		)?)
	}

	/// The account that runs `owner`'s triggered calls on the execution chain.
	pub fn execution_derivative(&self, owner: &Account) -> Result<Account, CoreError> {
		Ok(derive_v3(
			owner.as_bytes(),
			self.config.chains.control.para_id,
			owner.format(),
		)?)
	}

	pub fn derive_destination_address(
		&self,
		owner: &Account,
		para_id: u32,
		scheme: DerivationScheme,
	) -> Result<Account, CoreError> {
		Ok(derive(owner.as_bytes(), para_id, scheme)?)
	}

	/// Provisions, assembles and submits one task, signed by `signer`, and
	/// waits for the control chain to report it.
	///
	/// Dispatch failures after inclusion are returned in the receipt, with
	/// the chain's own error text.
	pub async fn schedule_task(
		&self,
		request: TaskRequest,
		signer: &AccountService,
	) -> Result<ScheduleReceipt, CoreError> {
		let span = info_span!("schedule_task", request_id = %Uuid::new_v4());
		self.schedule(request, signer).instrument(span).await
	}

	async fn schedule(
		&self,
		request: TaskRequest,
		signer: &AccountService,
	) -> Result<ScheduleReceipt, CoreError> {
		let owner = signer.get_address().await?;
		let control_derivative = self.control_derivative(&owner)?;
		let execution_derivative = self.execution_derivative(&owner)?;
		info!(
			%owner,
			%control_derivative,
			%execution_derivative,
			pair = %request.asset_pair,
			"Scheduling task"
		);

		let provisioning = &self.config.provisioning;
		let control_requirements = [Requirement::ProxyAuthorization {
			delegate: control_derivative,
			proxy_type: provisioning.proxy_type,
		}];
		let control_calls = self.plan(&owner, &self.control, &control_requirements).await?;
		if !control_calls.is_empty() {
			let outcome = self.submitter.submit(&self.control, control_calls, signer).await?;
			if !outcome.is_success() {
				// a concurrent schedule for the same owner may have granted it first
				let unmet = self
					.planner
					.plan(&owner, &self.control, &control_requirements)
					.await?;
				if !unmet.is_empty() {
					outcome.into_result()?;
				}
				warn!(
					chain = %self.control.name(),
					%control_derivative,
					"Proxy grant failed but the proxy is in place, continuing"
				);
			}
		}

		let mut calls = self
			.plan(
				&owner,
				&self.execution,
				&[
					Requirement::ProxyAuthorization {
						delegate: execution_derivative,
						proxy_type: provisioning.proxy_type,
					},
					Requirement::MinimumBalance {
						account: execution_derivative,
						minimum: provisioning.min_derivative_balance,
					},
					Requirement::MinimumRemoteAssetBalance {
						remote: self.control.clone(),
						account: control_derivative,
						minimum: provisioning.min_derivative_asset_balance,
					},
				],
			)
			.await?;

		let expired_at = match request.expired_at {
			Some(expired_at) => expired_at,
			None => self.default_expiry()?,
		};
		let execution_para = self.config.chains.execution.para_id;
		let message = self
			.assembler
			.assemble(
				request.call,
				&owner,
				ScheduleParams {
					chain: self.config.task.price_chain.clone(),
					exchange: self.config.task.exchange.clone(),
					asset_pair: request.asset_pair,
					trigger_function: request.trigger_function,
					trigger_params: request.trigger_params,
					expired_at,
				},
				FeeDescriptor::native_of(execution_para),
				VersionedMultiLocation::V3(MultiLocation::sibling(execution_para)),
			)
			.await?;
		calls.push(message.outer_call.clone());

		let scheduled = EventCorrelator::new(self.control.clone())
			.subscribe(EventFilter::new("automationPrice", "TaskScheduled").who(owner))
			.await?
			.with_timeout(Some(self.config.correlation.scheduled_timeout()));

		let outcome = self.submitter.submit(&self.execution, calls, signer).await?;
		let task_id = if outcome.is_success() {
			scheduled
				.wait()
				.await
				.into_match()
				.and_then(|matched| matched.event().task_id().cloned())
		} else {
			warn!(
				failures = outcome.failures.len(),
				"Batch dispatch failed, not waiting for the task"
			);
			None
		};

		match &task_id {
			Some(task_id) => {
				info!(%task_id, finalized = outcome.finalized, "Task scheduled");
				self.event_bus
					.publish(SchedulerEvent::TaskScheduled {
						task_id: task_id.clone(),
					})
					.ok();
			}
			None if outcome.is_success() => {
				warn!("Task not yet observed on the control chain")
			}
			None => {}
		}

		Ok(ScheduleReceipt {
			task_id,
			finalized: outcome.finalized,
			block_hash: outcome.block_hash,
			dispatch_failures: outcome.failures,
			execution_fee: message.execution_fee,
			schedule_fee: message.schedule_fee,
		})
	}

	async fn plan(
		&self,
		owner: &Account,
		chain: &ChainHandle,
		requirements: &[Requirement],
	) -> Result<Vec<UnsignedCall>, CoreError> {
		let calls = self.planner.plan(owner, chain, requirements).await?;
		self.event_bus
			.publish(SchedulerEvent::ProvisioningPlanned {
				chain: chain.name().to_string(),
				owner: *owner,
				calls: calls.len(),
			})
			.ok();
		Ok(calls)
	}

	fn default_expiry(&self) -> Result<u64, CoreError> {
		let days = self.config.task.expiry_days;
		let out_of_range = || CoreError::Configuration(format!("task expiry of {} days is out of range", days));
		let delta = i64::try_from(days)
			.ok()
			.and_then(chrono::Duration::try_days)
			.ok_or_else(out_of_range)?;
		let expiry = Utc::now().checked_add_signed(delta).ok_or_else(out_of_range)?;
		u64::try_from(expiry.timestamp()).map_err(|_| out_of_range())
	}

	/// Submits `cancelTask` on the control chain and waits for finality.
	///
	/// The task list is not touched here; the task turns `Cancelled` when the
	/// chain's `TaskCancelled` event arrives.
	pub async fn cancel_task(
		&self,
		task_id: &TaskId,
		signer: &AccountService,
	) -> Result<SubmissionOutcome, CoreError> {
		info!(%task_id, "Cancelling task");
		let call = self
			.control
			.build_call(RuntimeCall::CancelTask {
				task_id: task_id.clone(),
			})
			.await?;
		let outcome = self.submitter.submit(&self.control, vec![call], signer).await?;
		if let Some(failure) = outcome.failures.first() {
			warn!(%task_id, error = %failure.error, "Cancellation failed");
		}
		Ok(outcome)
	}

	pub fn task_list(&self) -> Vec<TaskEntry> {
		self.reconciler.snapshot().into_values().collect()
	}

	pub fn watch_tasks(&self) -> watch::Receiver<TaskMap> {
		self.reconciler.subscribe()
	}

	/// Calls `callback` with the current task map, then again on every change,
	/// from a task on the caller's runtime.
	pub async fn subscribe_task_list<F>(&self, callback: F) -> TaskListSubscription
	where
		F: Fn(&TaskMap) + Send + 'static,
	{
		let mut updates = self.reconciler.subscribe();
		let handle = tokio::spawn(async move {
			loop {
				let tasks = updates.borrow_and_update().clone();
				callback(&tasks);
				if updates.changed().await.is_err() {
					break;
				}
			}
		});
		TaskListSubscription { handle }
	}

	/// Tracker over this engine's chains with the configured stage timeouts.
	pub fn execution_tracker(&self) -> ExecutionTracker {
		let correlation = &self.config.correlation;
		ExecutionTracker::new(self.control.clone(), self.execution.clone())
			.with_timeouts(StageTimeouts {
				scheduled: correlation.scheduled_timeout(),
				triggered: correlation.triggered_timeout(),
				executed: correlation.executed_timeout(),
			})
			.with_event_bus(self.event_bus.clone())
	}

	pub async fn track_execution(&self, task_id: &TaskId) -> Result<ExecutionReport, CoreError> {
		Ok(self.execution_tracker().track(task_id).await?)
	}

	/// Starts feeding control chain task signals into the task list.
	pub async fn start(&self) -> Result<(), CoreError> {
		self.lifecycle.transition(EngineState::Starting).await?;

		let mut monitor = TaskMonitor::new(self.control.clone());
		if let Some(interval) = self.resync_interval {
			monitor = monitor.with_resync_interval(interval);
		}
		let mut signals = match monitor.watch().await {
			Ok(signals) => signals,
			Err(e) => {
				self.lifecycle.transition(EngineState::Failed).await?;
				return Err(e.into());
			}
		};

		let reconciler = self.reconciler.clone();
		let mut shutdown = self.lifecycle.subscribe_shutdown();
		let chain = self.control.name().to_string();
		let handle = tokio::spawn(async move {
			loop {
				tokio::select! {
					signal = signals.next() => match signal {
						Some(signal) => {
							if reconciler.apply(signal) {
								debug!(%chain, "Task list updated");
							}
						}
						None => {
							warn!(%chain, "Task signals ended");
							break;
						}
					},
					_ = shutdown.recv() => break,
				}
			}
		});
		*self.sync_task.lock().await = Some(handle);

		self.lifecycle.transition(EngineState::Running).await?;
		info!(engine = %self.config.engine.name, "Engine started");
		Ok(())
	}

	/// Stops the task sync. Chain handles stay open.
	pub async fn shutdown(&self) -> Result<(), CoreError> {
		self.lifecycle.stop().await?;
		if let Some(handle) = self.sync_task.lock().await.take() {
			if let Err(e) = handle.await {
				warn!(error = %e, "Task sync ended abnormally");
			}
		}
		info!(engine = %self.config.engine.name, "Engine stopped");
		Ok(())
	}

	/// Stops the task sync if it runs, then closes every chain handle.
	pub async fn close(&self) -> Result<(), CoreError> {
		if self.lifecycle.is_running().await {
			self.shutdown().await?;
		}
		self.chains.lock().await.close_all().await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::EngineBuilder;
	use async_trait::async_trait;
	use scheduler_account::{AccountError, AccountInterface};
	use scheduler_chains::InMemoryChain;
	use scheduler_config::{ConfigFormat, ConfigLoader};
	use scheduler_discovery::ExecutionStage;
	use scheduler_types::xcm::{LocationVersion, Network};
	use scheduler_types::{
		AccountFormat, CallMethod, ChainClient, ChainError, EventSubscription, ModuleError,
		ProxyDefinition, ProxyType, SchedulerError, SignedCall, Signature, StatusStream,
		StorageQuery, StorageValue, SubscriptionId, TaskStatus, Weight,
	};
	use std::sync::atomic::{AtomicBool, Ordering};
	use std::time::Instant;
	use tokio::time::timeout;

	const OWNER: Account = Account::Id32([0x11; 32]);
	const BOB: Account = Account::Id32([0x22; 32]);

	const CONFIG: &str = r#"
[engine]
name = "engine-test"

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

	struct FixedSigner(Account);

	#[async_trait]
	impl AccountInterface for FixedSigner {
		async fn address(&self) -> Result<Account, AccountError> {
			Ok(self.0)
		}

		async fn sign(&self, _payload: &[u8]) -> Result<Signature, AccountError> {
			Ok(Signature(vec![0u8; 64]))
		}
	}

	struct Harness {
		engine: SchedulerEngine,
		execution: Arc<InMemoryChain>,
		control: Arc<InMemoryChain>,
		signer: AccountService,
	}

	/// Answers the first proxy lookup with an empty list, as seen by a
	/// planner that raced another schedule for the same owner.
	struct StaleProxies {
		inner: Arc<InMemoryChain>,
		stale: AtomicBool,
	}

	#[async_trait]
	impl ChainClient for StaleProxies {
		fn name(&self) -> &str {
			self.inner.name()
		}

		fn account_format(&self) -> AccountFormat {
			self.inner.account_format()
		}

		async fn query_state(&self, query: StorageQuery) -> Result<StorageValue, ChainError> {
			if matches!(query, StorageQuery::Proxies(_)) && self.stale.swap(false, Ordering::SeqCst) {
				return Ok(StorageValue::Proxies(Vec::new()));
			}
			self.inner.query_state(query).await
		}

		async fn build_call(&self, call: RuntimeCall) -> Result<UnsignedCall, ChainError> {
			self.inner.build_call(call).await
		}

		async fn estimate_weight(
			&self,
			call: &UnsignedCall,
			fee_payer: &Account,
		) -> Result<Weight, ChainError> {
			self.inner.estimate_weight(call, fee_payer).await
		}

		async fn submit(&self, call: SignedCall) -> Result<StatusStream, ChainError> {
			self.inner.submit(call).await
		}

		async fn subscribe_events(&self) -> Result<EventSubscription, ChainError> {
			self.inner.subscribe_events().await
		}

		fn unsubscribe(&self, id: SubscriptionId) {
			self.inner.unsubscribe(id)
		}

		async fn close(&self) -> Result<(), ChainError> {
			self.inner.close().await
		}
	}

	async fn harness() -> Harness {
		harness_with(|control| control as ChainHandle).await
	}

	async fn harness_with(control_handle: impl FnOnce(Arc<InMemoryChain>) -> ChainHandle) -> Harness {
		let config = ConfigLoader::new().parse(CONFIG, ConfigFormat::Toml).unwrap();
		let execution = Arc::new(InMemoryChain::new("shibuya", 2000, AccountFormat::AccountId32));
		let control = Arc::new(InMemoryChain::new("turing", 2114, AccountFormat::AccountId32));
		execution.connect(&control);
		control.set_origin_converter(Box::new(|para: u32, account: &Account| {
			derive_v2(account.as_bytes(), para, LocationVersion::V3, Network::Any).unwrap()
		}));
		execution.set_origin_converter(Box::new(|para: u32, account: &Account| {
			derive_v3(account.as_bytes(), para, account.format()).unwrap()
		}));
		execution.set_call_weight(CallMethod::new("proxy", "proxy"), Weight::new(500_000_000, 10_000));
		execution.set_weight_to_fee(1, 1_000);
		control.set_call_weight(
			CallMethod::new("automationPrice", "scheduleXcmpTaskThroughProxy"),
			Weight::new(800_000_000, 5_000),
		);
		control.register_asset(
			VersionedMultiLocation::V3(MultiLocation::sibling(2000)),
			1,
			416_000_000_000,
		);
		execution.set_balance(OWNER, 1_000_000_000_000);

		let engine = EngineBuilder::new(config)
			.with_chain(execution.clone())
			.with_chain(control_handle(control.clone()))
			.build()
			.await
			.unwrap();
		Harness {
			engine,
			execution,
			control,
			signer: AccountService::new(Box::new(FixedSigner(OWNER))),
		}
	}

	fn request() -> TaskRequest {
		TaskRequest::new(
			RuntimeCall::Transfer { dest: BOB, value: 5 },
			AssetPair::new("WRSTR", "USDT"),
			TriggerFunction::GreaterThan,
			100,
		)
	}

	async fn wait_for_status(tasks: &mut watch::Receiver<TaskMap>, task_id: &TaskId, status: TaskStatus) {
		timeout(
			Duration::from_secs(5),
			tasks.wait_for(|tasks| tasks.get(task_id).map(|entry| entry.status) == Some(status)),
		)
		.await
		.unwrap()
		.unwrap();
	}

	#[tokio::test]
	async fn test_schedule_trigger_and_complete() {
		let h = harness().await;
		h.engine.start().await.unwrap();
		let mut tasks = h.engine.watch_tasks();

		let receipt = h.engine.schedule_task(request(), &h.signer).await.unwrap();
		assert!(receipt.finalized);
		assert!(receipt.dispatch_failures.is_empty());
		assert_eq!(receipt.execution_fee, 4_500_000);
		assert_eq!(receipt.schedule_fee, 1_996_800_000);
		let task_id = receipt.task_id.unwrap();

		let control_derivative = h.engine.control_derivative(&OWNER).unwrap();
		let execution_derivative = h.engine.execution_derivative(&OWNER).unwrap();
		assert!(h
			.control
			.proxies_of(&OWNER)
			.iter()
			.any(|proxy| proxy.delegate == control_derivative));
		assert!(h
			.execution
			.proxies_of(&OWNER)
			.iter()
			.any(|proxy| proxy.delegate == execution_derivative));
		assert_eq!(h.execution.free_balance_of(&execution_derivative), 1_000_000_000);
		assert_eq!(
			h.control.asset_balance_of(&control_derivative, 1),
			10_000_000_000 - 1_996_800_000
		);
		assert_eq!(h.control.task(&task_id).unwrap().owner, OWNER);

		wait_for_status(&mut tasks, &task_id, TaskStatus::Scheduled).await;

		let tracking = h.engine.execution_tracker().start(&task_id).await.unwrap();
		h.control.trigger_task(&task_id).unwrap();
		let report = tracking.wait().await;
		assert_eq!(report.last_observed(), Some(ExecutionStage::Executed));
		assert_eq!(report.executed.unwrap().proxy_result, Some(Ok(())));
		assert_eq!(h.execution.free_balance_of(&BOB), 5);

		wait_for_status(&mut tasks, &task_id, TaskStatus::Completed).await;

		h.engine.shutdown().await.unwrap();
		assert_eq!(h.control.active_subscriptions(), 0);
		assert_eq!(h.execution.active_subscriptions(), 0);
	}

	#[tokio::test]
	async fn test_duplicate_proxy_grant_is_tolerated() {
		let h = harness_with(|control| {
			Arc::new(StaleProxies {
				inner: control,
				stale: AtomicBool::new(true),
			}) as ChainHandle
		})
		.await;
		let control_derivative = h.engine.control_derivative(&OWNER).unwrap();
		h.control.add_proxy(
			OWNER,
			ProxyDefinition {
				delegate: control_derivative,
				proxy_type: ProxyType::Any,
				delay: 0,
			},
		);

		let receipt = h.engine.schedule_task(request(), &h.signer).await.unwrap();
		assert!(receipt.dispatch_failures.is_empty());
		assert!(receipt.task_id.is_some());
		// the grant was submitted and failed as a duplicate
		assert_eq!(h.control.submissions().len(), 1);
		assert_eq!(h.control.proxies_of(&OWNER).len(), 1);
	}

	#[tokio::test]
	async fn test_failed_proxy_grant_aborts_when_still_missing() {
		let h = harness().await;
		h.control.fail_next_call(
			CallMethod::new("proxy", "addProxy"),
			ModuleError::new("proxy", "TooMany", "Account has too many proxies."),
		);

		let result = h.engine.schedule_task(request(), &h.signer).await;
		assert!(matches!(
			result,
			Err(CoreError::Scheduler(SchedulerError::ModuleDispatchFailed { ref method, .. })) if method == "TooMany"
		));
		assert!(h.execution.submissions().is_empty());
	}

	#[tokio::test]
	async fn test_second_schedule_skips_met_requirements() {
		let h = harness().await;
		h.engine.schedule_task(request(), &h.signer).await.unwrap();
		assert_eq!(h.control.submissions().len(), 1);

		let receipt = h.engine.schedule_task(request(), &h.signer).await.unwrap();
		assert!(receipt.task_id.is_some());
		// the control-side proxy exists now
		assert_eq!(h.control.submissions().len(), 1);

		// proxy and balance on the execution side are in place; only the fee
		// asset spent by the first task is topped up again
		let submissions = h.execution.submissions();
		let RuntimeCall::Batch { calls } = &submissions[1].call.call else {
			panic!("expected a batch");
		};
		let methods: Vec<String> = calls.iter().map(|call| call.method.to_string()).collect();
		assert_eq!(methods, vec!["xtokens.transferMultiasset", "polkadotXcm.send"]);
	}

	#[tokio::test]
	async fn test_cancel_applies_on_event() {
		let h = harness().await;
		h.engine.start().await.unwrap();
		let mut tasks = h.engine.watch_tasks();
		let task_id = h
			.engine
			.schedule_task(request(), &h.signer)
			.await
			.unwrap()
			.task_id
			.unwrap();
		wait_for_status(&mut tasks, &task_id, TaskStatus::Scheduled).await;

		let outcome = h.engine.cancel_task(&task_id, &h.signer).await.unwrap();
		assert!(outcome.finalized);
		assert!(outcome.is_success());
		wait_for_status(&mut tasks, &task_id, TaskStatus::Cancelled).await;
		assert!(h.control.task(&task_id).is_none());

		h.engine.close().await.unwrap();
	}

	#[tokio::test]
	async fn test_cancel_unknown_task_reports_chain_error() {
		let h = harness().await;
		let outcome = h
			.engine
			.cancel_task(&TaskId::new("404"), &h.signer)
			.await
			.unwrap();
		assert!(!outcome.is_success());
		assert_eq!(outcome.failures[0].error.docs, "The task does not exist.");
	}

	#[tokio::test]
	async fn test_failed_transport_call_is_reported() {
		let h = harness().await;
		h.execution.fail_next_call(
			CallMethod::new("polkadotXcm", "send"),
			ModuleError::new("polkadotXcm", "SendFailure", "The message could not be sent."),
		);

		let started = Instant::now();
		let receipt = h.engine.schedule_task(request(), &h.signer).await.unwrap();
		assert!(receipt.task_id.is_none());
		assert_eq!(receipt.dispatch_failures.len(), 1);
		assert_eq!(receipt.dispatch_failures[0].call_index, Some(3));
		assert_eq!(receipt.dispatch_failures[0].error.method, "SendFailure");
		assert!(started.elapsed() < Duration::from_secs(1));
		assert_eq!(h.control.active_subscriptions(), 0);
	}

	#[tokio::test]
	async fn test_task_list_callback() {
		let h = harness().await;
		let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
		let subscription = h
			.engine
			.subscribe_task_list(move |tasks| {
				let _ = tx.send(tasks.len());
			})
			.await;
		assert_eq!(rx.recv().await, Some(0));

		h.engine.start().await.unwrap();
		h.engine.schedule_task(request(), &h.signer).await.unwrap();
		assert_eq!(rx.recv().await, Some(1));

		drop(subscription);
		h.engine.shutdown().await.unwrap();
	}

	#[tokio::test]
	async fn test_build_rejects_mismatched_para_id() {
		let config = ConfigLoader::new().parse(CONFIG, ConfigFormat::Toml).unwrap();
		let result = EngineBuilder::new(config)
			.with_chain(Arc::new(InMemoryChain::new("shibuya", 2001, AccountFormat::AccountId32)))
			.with_chain(Arc::new(InMemoryChain::new("turing", 2114, AccountFormat::AccountId32)))
			.build()
			.await;
		assert!(matches!(result, Err(CoreError::Configuration(_))));
	}

	#[tokio::test]
	async fn test_derive_destination_address() {
		let h = harness().await;
		let scheme = DerivationScheme::V3 {
			account_format: AccountFormat::AccountId32,
		};
		assert_eq!(
			h.engine.derive_destination_address(&OWNER, 2114, scheme).unwrap(),
			h.engine.execution_derivative(&OWNER).unwrap()
		);
	}
}

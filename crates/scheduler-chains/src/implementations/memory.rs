//! In-memory chain.
//!
//! Models the storage and pallets the scheduler touches (balances, proxies,
//! asset registry, token balances, the price-automation task list, XCM
//! transport) closely enough to drive the whole scheduling flow without a
//! node. Two instances can be connected so that cross-chain transfers and
//! messages sent from one are received by the other.
//!
//! Every submitted extrinsic is included in its own block. The block's events
//! are broadcast to all subscribers before the status stream is returned.

use async_trait::async_trait;
use codec::Encode;
use dashmap::DashMap;
use futures::stream;
use scheduler_types::xcm::{
	v3::{AssetId, Fungibility, Instruction, Junction, Junctions, MultiLocation},
	VersionedMultiAsset, VersionedMultiLocation, VersionedXcm,
};
use scheduler_types::{
	blake2_256, Account, AccountFormat, CallMethod, ChainClient, ChainError,
	ChainEvent, DispatchError, EventBatch, EventRecord, EventSubscription, ModuleError, Phase,
	ProxyDefinition, RuntimeCall, ScheduleXcmpTask, SignedCall, StatusStream, StorageQuery,
	StorageValue, SubscriptionId, Task, TaskAction, TaskId, TxStatus, UnsignedCall, Weight, H256,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info};

/// Maps `(origin para id, origin account)` to the local account an inbound
/// XCM `Transact` dispatches as.
pub type OriginConverter = Box<dyn Fn(u32, &Account) -> Account + Send + Sync>;

/// Effects that leave this chain, applied to peers once the local block is
/// sealed.
enum Outbound {
	Deposit {
		para_id: u32,
		beneficiary: Account,
		amount: u128,
	},
	Message {
		para_id: u32,
		origin: Account,
		message: VersionedXcm,
		hash: H256,
	},
}

struct ChainState {
	balances: HashMap<Account, u128>,
	asset_balances: HashMap<(Account, u32), u128>,
	proxies: HashMap<Account, Vec<ProxyDefinition>>,
	asset_registry: Vec<(VersionedMultiLocation, u32)>,
	fee_per_second: HashMap<u32, u128>,
	tasks: BTreeMap<TaskId, Task>,
	call_weights: HashMap<CallMethod, Weight>,
	default_weight: Weight,
	/// `fee = ref_time * numerator / denominator`
	weight_fee: (u128, u128),
	injected_failures: HashMap<CallMethod, ModuleError>,
	reject_next: Option<String>,
	hold_finality: bool,
	query_failure: Option<String>,
	known_calls: HashMap<Vec<u8>, RuntimeCall>,
	submissions: Vec<SignedCall>,
	task_nonce: u64,
}

impl Default for ChainState {
	fn default() -> Self {
		Self {
			balances: HashMap::new(),
			asset_balances: HashMap::new(),
			proxies: HashMap::new(),
			asset_registry: Vec::new(),
			fee_per_second: HashMap::new(),
			tasks: BTreeMap::new(),
			call_weights: HashMap::new(),
			default_weight: Weight::new(200_000_000, 4_096),
			weight_fee: (1, 1),
			injected_failures: HashMap::new(),
			reject_next: None,
			hold_finality: false,
			query_failure: None,
			known_calls: HashMap::new(),
			submissions: Vec::new(),
			task_nonce: 0,
		}
	}
}

fn module_error(section: &str, method: &str, docs: &str) -> DispatchError {
	DispatchError::Module(ModuleError::new(section, method, docs))
}

/// Pallet and call indices of the calls the scheduler builds.
fn call_indices(method: &CallMethod) -> (u8, u8) {
	match (method.section.as_str(), method.method.as_str()) {
		("balances", "transfer") => (10, 0),
		("utility", "batch") => (40, 0),
		("proxy", "proxy") => (42, 0),
		("proxy", "addProxy") => (42, 1),
		("polkadotXcm", "send") => (51, 0),
		("xtokens", "transferMultiasset") => (54, 1),
		("automationPrice", "scheduleXcmpTaskThroughProxy") => (62, 2),
		("automationPrice", "cancelTask") => (62, 4),
		_ => (255, 0),
	}
}

/// Beneficiary of a `transferMultiasset` destination
/// `{ parents: 1, X2(Parachain(id), Account*) }`.
fn transfer_destination(dest: &VersionedMultiLocation) -> Option<(u32, Account)> {
	let VersionedMultiLocation::V3(MultiLocation {
		parents: 1,
		interior: Junctions::X2(Junction::Parachain(para_id), account),
	}) = dest
	else {
		return None;
	};
	let beneficiary = match account {
		Junction::AccountId32 { id, .. } => Account::Id32(*id),
		Junction::AccountKey20 { key, .. } => Account::Key20(*key),
		_ => return None,
	};
	Some((*para_id, beneficiary))
}

fn sibling_para(dest: &VersionedMultiLocation) -> Option<u32> {
	match dest {
		VersionedMultiLocation::V3(location) => location.sibling_para_id(),
		VersionedMultiLocation::V2(_) => None,
	}
}

impl ChainState {
	fn asset_id_for(&self, location: &VersionedMultiLocation) -> Option<u32> {
		self.asset_registry
			.iter()
			.find(|(registered, _)| registered == location)
			.map(|(_, id)| *id)
	}

	fn dispatch(
		&mut self,
		block: u64,
		origin: Account,
		call: &RuntimeCall,
		events: &mut Vec<ChainEvent>,
		outbound: &mut Vec<Outbound>,
	) -> Result<(), DispatchError> {
		if let Some(err) = self.injected_failures.remove(&call.method()) {
			return Err(DispatchError::Module(err));
		}

		match call {
			RuntimeCall::Transfer { dest, value } => {
				self.debit(&origin, *value)?;
				*self.balances.entry(*dest).or_default() += value;
				events.push(ChainEvent::Transfer {
					from: origin,
					to: *dest,
					amount: *value,
				});
				Ok(())
			}
			RuntimeCall::AddProxy {
				delegate,
				proxy_type,
				delay,
			} => {
				let proxies = self.proxies.entry(origin).or_default();
				if proxies
					.iter()
					.any(|p| p.delegate == *delegate && p.proxy_type == *proxy_type)
				{
					return Err(module_error("proxy", "Duplicate", "Account is already a proxy."));
				}
				proxies.push(ProxyDefinition {
					delegate: *delegate,
					proxy_type: *proxy_type,
					delay: *delay,
				});
				events.push(ChainEvent::ProxyAdded {
					delegator: origin,
					delegatee: *delegate,
					proxy_type: *proxy_type,
					delay: *delay,
				});
				Ok(())
			}
			RuntimeCall::Proxy {
				real,
				force_proxy_type,
				call,
			} => {
				let authorised = self.proxies.get(real).is_some_and(|proxies| {
					proxies.iter().any(|p| {
						p.delegate == origin
							&& match force_proxy_type {
								Some(forced) => *forced == p.proxy_type,
								None => true,
							}
					})
				});
				if !authorised {
					return Err(module_error(
						"proxy",
						"NotProxy",
						"Sender is not a proxy of the account to be proxied.",
					));
				}
				let result = self.dispatch(block, *real, &call.call, events, outbound);
				events.push(ChainEvent::ProxyExecuted { result });
				Ok(())
			}
			RuntimeCall::TransferMultiasset { asset, dest, .. } => {
				let VersionedMultiAsset::V3(asset) = asset;
				let amount = match (&asset.id, &asset.fun) {
					(AssetId::Concrete(location), Fungibility::Fungible(amount))
						if *location == MultiLocation::here() =>
					{
						*amount
					}
					_ => {
						return Err(module_error(
							"xTokens",
							"AssetNotFound",
							"Only the native asset can be transferred.",
						))
					}
				};
				let (para_id, beneficiary) = transfer_destination(dest).ok_or_else(|| {
					module_error("xTokens", "InvalidDest", "Invalid transfer destination.")
				})?;
				self.debit(&origin, amount)?;
				outbound.push(Outbound::Deposit {
					para_id,
					beneficiary,
					amount,
				});
				Ok(())
			}
			RuntimeCall::ScheduleXcmpTaskThroughProxy(args) => {
				let owner = args.schedule_as;
				let authorised = self
					.proxies
					.get(&owner)
					.is_some_and(|proxies| proxies.iter().any(|p| p.delegate == origin));
				if !authorised {
					return Err(module_error(
						"automationPrice",
						"ProxyNotFound",
						"The scheduling origin is not a proxy of the task owner.",
					));
				}
				self.task_nonce += 1;
				let task_id = TaskId::new(format!("{}-0-{}", block, self.task_nonce));
				self.tasks
					.insert(task_id.clone(), task_from_args(task_id.clone(), args));
				events.push(ChainEvent::TaskScheduled {
					who: owner,
					task_id,
				});
				Ok(())
			}
			RuntimeCall::CancelTask { task_id } => {
				let task = self.tasks.get(task_id).ok_or_else(|| {
					module_error("automationPrice", "TaskDoesNotExist", "The task does not exist.")
				})?;
				if task.owner != origin {
					return Err(module_error(
						"automationPrice",
						"NotTaskOwner",
						"Only the task owner can cancel the task.",
					));
				}
				self.tasks.remove(task_id);
				events.push(ChainEvent::TaskCancelled {
					who: origin,
					task_id: task_id.clone(),
				});
				Ok(())
			}
			RuntimeCall::XcmSend { dest, message } => {
				let para_id = sibling_para(dest).ok_or_else(|| {
					module_error(
						"polkadotXcm",
						"Unreachable",
						"The desired destination was unreachable.",
					)
				})?;
				let hash = H256(blake2_256(&message.encode()));
				events.push(ChainEvent::XcmpMessageSent { message_hash: hash });
				outbound.push(Outbound::Message {
					para_id,
					origin,
					message: message.clone(),
					hash,
				});
				Ok(())
			}
			RuntimeCall::Batch { calls } => {
				self.dispatch_batch(block, origin, calls, events, outbound);
				Ok(())
			}
			RuntimeCall::Opaque { .. } => Ok(()),
		}
	}

	/// `utility.batch`: stops at the first failing call, keeping the effects of
	/// the calls before it.
	fn dispatch_batch(
		&mut self,
		block: u64,
		origin: Account,
		calls: &[UnsignedCall],
		events: &mut Vec<ChainEvent>,
		outbound: &mut Vec<Outbound>,
	) {
		for (index, call) in calls.iter().enumerate() {
			if let Err(error) = self.dispatch(block, origin, &call.call, events, outbound) {
				events.push(ChainEvent::BatchInterrupted {
					index: index as u32,
					error,
				});
				return;
			}
		}
		events.push(ChainEvent::BatchCompleted);
	}

	fn debit(&mut self, who: &Account, amount: u128) -> Result<(), DispatchError> {
		let balance = self.balances.entry(*who).or_default();
		if *balance < amount {
			return Err(module_error(
				"balances",
				"InsufficientBalance",
				"Balance too low to send value.",
			));
		}
		*balance -= amount;
		Ok(())
	}
}

fn task_from_args(task_id: TaskId, args: &ScheduleXcmpTask) -> Task {
	Task {
		task_id,
		owner: args.schedule_as,
		chain: args.chain.clone(),
		exchange: args.exchange.clone(),
		asset_pair: args.asset_pair.clone(),
		expired_at: args.expired_at,
		trigger_function: args.trigger_function,
		trigger_params: args.trigger_params.clone(),
		action: TaskAction {
			destination: args.destination.clone(),
			schedule_fee: args.schedule_fee.clone(),
			execution_fee: args.execution_fee.clone(),
			encoded_call: args.encoded_call.clone(),
			encoded_call_weight: args.encoded_call_weight,
			overall_weight: args.overall_weight,
			schedule_as: Some(args.schedule_as),
		},
	}
}

pub struct InMemoryChain {
	name: String,
	para_id: u32,
	account_format: AccountFormat,
	state: Mutex<ChainState>,
	subscribers: DashMap<SubscriptionId, mpsc::UnboundedSender<EventBatch>>,
	next_subscription: AtomicU64,
	block_number: AtomicU64,
	closed: AtomicBool,
	peers: DashMap<u32, Weak<InMemoryChain>>,
	origin_converter: Mutex<Option<OriginConverter>>,
}

impl InMemoryChain {
	pub fn new(name: impl Into<String>, para_id: u32, account_format: AccountFormat) -> Self {
		Self {
			name: name.into(),
			para_id,
			account_format,
			state: Mutex::new(ChainState::default()),
			subscribers: DashMap::new(),
			next_subscription: AtomicU64::new(0),
			block_number: AtomicU64::new(0),
			closed: AtomicBool::new(false),
			peers: DashMap::new(),
			origin_converter: Mutex::new(None),
		}
	}

	fn state(&self) -> MutexGuard<'_, ChainState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn ensure_open(&self) -> Result<(), ChainError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(ChainError::Closed);
		}
		Ok(())
	}

	/// Connects two chains so transfers and messages between them arrive.
	pub fn connect(self: &Arc<Self>, peer: &Arc<InMemoryChain>) {
		self.peers.insert(peer.para_id, Arc::downgrade(peer));
		peer.peers.insert(self.para_id, Arc::downgrade(self));
	}

	fn peer(&self, para_id: u32) -> Option<Arc<InMemoryChain>> {
		self.peers.get(&para_id).and_then(|peer| peer.upgrade())
	}

	/// Sets how inbound messages from sibling accounts map to local origins.
	pub fn set_origin_converter(&self, converter: OriginConverter) {
		*self
			.origin_converter
			.lock()
			.unwrap_or_else(PoisonError::into_inner) = Some(converter);
	}

	fn convert_origin(&self, para_id: u32, account: &Account) -> Option<Account> {
		self.origin_converter
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.map(|convert| convert(para_id, account))
	}

	pub fn set_balance(&self, account: Account, amount: u128) {
		self.state().balances.insert(account, amount);
	}

	pub fn set_asset_balance(&self, account: Account, asset_id: u32, amount: u128) {
		self.state().asset_balances.insert((account, asset_id), amount);
	}

	/// Registers a foreign asset by location, with its fee per second.
	pub fn register_asset(&self, location: VersionedMultiLocation, asset_id: u32, fee_per_second: u128) {
		let mut state = self.state();
		state.asset_registry.push((location, asset_id));
		state.fee_per_second.insert(asset_id, fee_per_second);
	}

	pub fn add_proxy(&self, delegator: Account, proxy: ProxyDefinition) {
		self.state().proxies.entry(delegator).or_default().push(proxy);
	}

	pub fn insert_task(&self, task: Task) {
		self.state().tasks.insert(task.task_id.clone(), task);
	}

	pub fn set_call_weight(&self, method: CallMethod, weight: Weight) {
		self.state().call_weights.insert(method, weight);
	}

	pub fn set_default_weight(&self, weight: Weight) {
		self.state().default_weight = weight;
	}

	/// Weight-to-fee conversion: `ref_time * numerator / denominator`.
	pub fn set_weight_to_fee(&self, numerator: u128, denominator: u128) {
		self.state().weight_fee = (numerator, denominator.max(1));
	}

	/// The next dispatch of `method` fails with `error`.
	pub fn fail_next_call(&self, method: CallMethod, error: ModuleError) {
		self.state().injected_failures.insert(method, error);
	}

	/// The next submission is declared invalid before inclusion.
	pub fn reject_next_submission(&self, reason: impl Into<String>) {
		self.state().reject_next = Some(reason.into());
	}

	/// While held, submissions stop at in-block and never finalize.
	pub fn hold_finality(&self, hold: bool) {
		self.state().hold_finality = hold;
	}

	/// Makes every storage query fail until cleared with `None`.
	pub fn fail_queries(&self, reason: Option<String>) {
		self.state().query_failure = reason;
	}

	pub fn free_balance_of(&self, account: &Account) -> u128 {
		self.state().balances.get(account).copied().unwrap_or(0)
	}

	pub fn asset_balance_of(&self, account: &Account, asset_id: u32) -> u128 {
		self.state()
			.asset_balances
			.get(&(*account, asset_id))
			.copied()
			.unwrap_or(0)
	}

	pub fn proxies_of(&self, account: &Account) -> Vec<ProxyDefinition> {
		self.state().proxies.get(account).cloned().unwrap_or_default()
	}

	pub fn task(&self, task_id: &TaskId) -> Option<Task> {
		self.state().tasks.get(task_id).cloned()
	}

	pub fn submissions(&self) -> Vec<SignedCall> {
		self.state().submissions.clone()
	}

	/// Number of event subscriptions not yet released.
	pub fn active_subscriptions(&self) -> usize {
		self.subscribers.len()
	}

	pub fn block_number(&self) -> u64 {
		self.block_number.load(Ordering::SeqCst)
	}

	/// Seals a block containing `events` and broadcasts it to subscribers.
	pub fn emit(&self, events: Vec<ChainEvent>) -> (H256, EventBatch) {
		let block = self.block_number.fetch_add(1, Ordering::SeqCst) + 1;
		let mut preimage = self.name.as_bytes().to_vec();
		preimage.extend_from_slice(&block.to_le_bytes());
		let block_hash = H256(blake2_256(&preimage));

		let batch: EventBatch = events
			.into_iter()
			.map(|event| EventRecord::new(Phase::ApplyExtrinsic(0), event))
			.collect();

		debug!(
			chain = %self.name,
			block,
			events = batch.len(),
			"Sealed block"
		);
		for subscriber in self.subscribers.iter() {
			let _ = subscriber.value().send(batch.clone());
		}
		(block_hash, batch)
	}

	fn apply_outbound(&self, outbound: Vec<Outbound>) {
		for effect in outbound {
			match effect {
				Outbound::Deposit {
					para_id,
					beneficiary,
					amount,
				} => {
					if let Some(peer) = self.peer(para_id) {
						peer.receive_deposit(self.para_id, beneficiary, amount);
					}
				}
				Outbound::Message {
					para_id,
					origin,
					message,
					hash,
				} => {
					if let Some(peer) = self.peer(para_id) {
						peer.receive_message(self.para_id, origin, message, hash);
					}
				}
			}
		}
	}

	fn receive_deposit(&self, from_para: u32, beneficiary: Account, amount: u128) {
		let location = VersionedMultiLocation::V3(MultiLocation::sibling(from_para));
		let mut state = self.state();
		if let Some(asset_id) = state.asset_id_for(&location) {
			*state
				.asset_balances
				.entry((beneficiary, asset_id))
				.or_default() += amount;
		}
	}

	fn receive_message(&self, from_para: u32, origin: Account, message: VersionedXcm, hash: H256) {
		let mut events = Vec::new();
		let outcome = match self.convert_origin(from_para, &origin) {
			Some(local_origin) => self.execute_message(from_para, local_origin, message, &mut events),
			None => Err("BadOrigin".to_string()),
		};
		match outcome {
			Ok(()) => events.push(ChainEvent::XcmpSuccess { message_hash: hash }),
			Err(error) => events.push(ChainEvent::XcmpFail {
				message_hash: hash,
				error,
			}),
		}
		self.emit(events);
	}

	fn execute_message(
		&self,
		from_para: u32,
		origin: Account,
		message: VersionedXcm,
		events: &mut Vec<ChainEvent>,
	) -> Result<(), String> {
		let VersionedXcm::V3(xcm) = message;
		let block = self.block_number() + 1;
		let mut state = self.state();
		let mut outbound = Vec::new();

		for instruction in xcm.0 {
			match instruction {
				Instruction::WithdrawAsset(assets) => {
					for asset in assets {
						let (AssetId::Concrete(location), Fungibility::Fungible(amount)) =
							(asset.id, asset.fun);
						let asset_id = state
							.asset_id_for(&VersionedMultiLocation::V3(location))
							.ok_or_else(|| "AssetNotFound".to_string())?;
						let balance = state.asset_balances.entry((origin, asset_id)).or_default();
						if *balance < amount {
							return Err("FailedToTransactAsset".to_string());
						}
						*balance -= amount;
					}
				}
				Instruction::BuyExecution { .. } => {}
				Instruction::Transact { call, .. } => {
					let call = state
						.known_calls
						.get(&call)
						.cloned()
						.ok_or_else(|| "FailedToDecode".to_string())?;
					state
						.dispatch(block, origin, &call, events, &mut outbound)
						.map_err(|e| e.to_string())?;
				}
			}
		}
		debug!(chain = %self.name, from_para, "Executed inbound message");
		Ok(())
	}

	/// Fires a scheduled task: the task's call travels to its destination
	/// chain and runs there, then the task is marked executed.
	///
	/// Returns the hash of the message carrying the call.
	pub fn trigger_task(&self, task_id: &TaskId) -> Result<H256, ChainError> {
		let task = self
			.state()
			.tasks
			.remove(task_id)
			.ok_or_else(|| ChainError::Query(format!("unknown task {}", task_id)))?;

		let mut preimage = task.action.encoded_call.clone();
		preimage.extend_from_slice(task_id.as_str().as_bytes());
		let hash = H256(blake2_256(&preimage));

		self.emit(vec![
			ChainEvent::TaskTriggered {
				who: task.owner,
				task_id: task_id.clone(),
			},
			ChainEvent::XcmpMessageSent { message_hash: hash },
		]);

		if let Some(peer) = sibling_para(&task.action.destination).and_then(|id| self.peer(id)) {
			peer.receive_task_call(self.para_id, task.owner, &task.action.encoded_call, hash);
		}

		self.emit(vec![ChainEvent::TaskExecuted {
			who: task.owner,
			task_id: task_id.clone(),
		}]);
		info!(chain = %self.name, task_id = %task_id, "Task triggered");
		Ok(hash)
	}

	fn receive_task_call(&self, from_para: u32, owner: Account, encoded_call: &[u8], hash: H256) {
		let mut events = Vec::new();
		let origin = self.convert_origin(from_para, &owner);
		let outcome = {
			let block = self.block_number() + 1;
			let mut state = self.state();
			let call = state.known_calls.get(encoded_call).cloned();
			match (origin, call) {
				(Some(origin), Some(call)) => {
					let mut outbound = Vec::new();
					state
						.dispatch(block, origin, &call, &mut events, &mut outbound)
						.map_err(|e| e.to_string())
				}
				(None, _) => Err("BadOrigin".to_string()),
				(_, None) => Err("FailedToDecode".to_string()),
			}
		};
		match outcome {
			Ok(()) => events.push(ChainEvent::XcmpSuccess { message_hash: hash }),
			Err(error) => events.push(ChainEvent::XcmpFail {
				message_hash: hash,
				error,
			}),
		}
		self.emit(events);
	}
}

#[async_trait]
impl ChainClient for InMemoryChain {
	fn name(&self) -> &str {
		&self.name
	}

	fn account_format(&self) -> AccountFormat {
		self.account_format
	}

	async fn query_state(&self, query: StorageQuery) -> Result<StorageValue, ChainError> {
		self.ensure_open()?;
		let state = self.state();
		if let Some(reason) = &state.query_failure {
			return Err(ChainError::Query(reason.clone()));
		}

		let value = match query {
			StorageQuery::ParachainId => StorageValue::ParachainId(self.para_id),
			StorageQuery::FreeBalance(account) => {
				StorageValue::Balance(state.balances.get(&account).copied().unwrap_or(0))
			}
			StorageQuery::AssetBalance { account, asset_id } => StorageValue::Balance(
				state
					.asset_balances
					.get(&(account, asset_id))
					.copied()
					.unwrap_or(0),
			),
			StorageQuery::Proxies(account) => {
				StorageValue::Proxies(state.proxies.get(&account).cloned().unwrap_or_default())
			}
			StorageQuery::AssetIdForLocation(location) => {
				StorageValue::AssetId(state.asset_id_for(&location))
			}
			StorageQuery::AssetFeePerSecond(asset_id) => {
				StorageValue::FeePerSecond(state.fee_per_second.get(&asset_id).copied())
			}
			StorageQuery::WeightToFee(weight) => {
				let (numerator, denominator) = state.weight_fee;
				let fee = weight
					.ref_time
					.checked_mul(numerator)
					.ok_or_else(|| ChainError::Query("weight to fee overflow".to_string()))?
					/ denominator;
				StorageValue::Fee(fee)
			}
			StorageQuery::Tasks => StorageValue::Tasks(state.tasks.values().cloned().collect()),
		};
		Ok(value)
	}

	async fn build_call(&self, call: RuntimeCall) -> Result<UnsignedCall, ChainError> {
		self.ensure_open()?;
		let (pallet_index, call_index) = call_indices(&call.method());
		let unsigned = UnsignedCall::new(call, pallet_index, call_index);
		self.state()
			.known_calls
			.insert(unsigned.encoded.clone(), unsigned.call.clone());
		Ok(unsigned)
	}

	async fn estimate_weight(
		&self,
		call: &UnsignedCall,
		_fee_payer: &Account,
	) -> Result<Weight, ChainError> {
		self.ensure_open()?;
		let state = self.state();
		Ok(state
			.call_weights
			.get(&call.method)
			.copied()
			.unwrap_or(state.default_weight))
	}

	async fn submit(&self, call: SignedCall) -> Result<StatusStream, ChainError> {
		self.ensure_open()?;

		let mut events = Vec::new();
		let mut outbound = Vec::new();
		let hold_finality = {
			let mut state = self.state();
			if let Some(reason) = state.reject_next.take() {
				info!(chain = %self.name, %reason, "Rejecting submission");
				return Ok(Box::pin(stream::iter(vec![
					TxStatus::Ready,
					TxStatus::Invalid(reason),
				])));
			}
			state.submissions.push(call.clone());

			let block = self.block_number() + 1;
			let signer = call.signer;
			match &call.call.call {
				RuntimeCall::Batch { calls } => {
					state.dispatch_batch(block, signer, calls, &mut events, &mut outbound);
					events.push(ChainEvent::ExtrinsicSuccess);
				}
				other => match state.dispatch(block, signer, other, &mut events, &mut outbound) {
					Ok(()) => events.push(ChainEvent::ExtrinsicSuccess),
					Err(error) => events.push(ChainEvent::ExtrinsicFailed { error }),
				},
			}
			state.hold_finality
		};

		let (block_hash, batch) = self.emit(events);
		self.apply_outbound(outbound);

		let mut statuses = vec![
			TxStatus::Ready,
			TxStatus::Broadcast,
			TxStatus::InBlock {
				block_hash,
				events: batch.clone(),
			},
		];
		if !hold_finality {
			statuses.push(TxStatus::Finalized {
				block_hash,
				events: batch,
			});
		}
		Ok(Box::pin(stream::iter(statuses)))
	}

	async fn subscribe_events(&self) -> Result<EventSubscription, ChainError> {
		self.ensure_open()?;
		let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
		let (tx, rx) = mpsc::unbounded_channel();
		self.subscribers.insert(id, tx);
		debug!(chain = %self.name, subscription = %id, "Subscribed to events");
		Ok(EventSubscription {
			id,
			stream: Box::pin(UnboundedReceiverStream::new(rx)),
		})
	}

	fn unsubscribe(&self, id: SubscriptionId) {
		if self.subscribers.remove(&id).is_some() {
			debug!(chain = %self.name, subscription = %id, "Unsubscribed from events");
		}
	}

	async fn close(&self) -> Result<(), ChainError> {
		self.closed.store(true, Ordering::SeqCst);
		self.subscribers.clear();
		info!(chain = %self.name, "Chain client closed");
		Ok(())
	}
}

//! Batch submission.
//!
//! `BatchSubmitter` signs a list of calls as one `utility.batch` (a single
//! call is sent as is), follows the status stream and classifies the result.
//! Rejections before inclusion are errors. Failures of individual calls after
//! inclusion are not: they are decoded from the block's events and returned
//! in the outcome, because the calls before them have already applied.

use futures::StreamExt;
use scheduler_account::AccountService;
use scheduler_types::{
	ChainEvent, ChainHandle, EventBatch, EventBus, ModuleError, Result, RuntimeCall,
	SchedulerError, SchedulerEvent, SignedCall, TxStatus, UnsignedCall, H256,
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Status at which `submit` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitFor {
	/// Included in a block. The block may still be retracted.
	InBlock,
	/// Irreversible.
	#[default]
	Finalized,
}

/// A call that failed after inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
	/// Position in the batch, when the batch reported it.
	pub call_index: Option<u32>,
	pub error: ModuleError,
}

#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
	pub block_hash: H256,
	/// `false` when the status stream ended, or the submitter stopped
	/// waiting, before finality.
	pub finalized: bool,
	pub events: EventBatch,
	pub failures: Vec<DispatchFailure>,
}

impl SubmissionOutcome {
	pub fn is_success(&self) -> bool {
		self.failures.is_empty()
	}

	/// Turns the first dispatch failure into an error.
	pub fn into_result(self) -> Result<Self> {
		match self.failures.first() {
			Some(failure) => Err(SchedulerError::ModuleDispatchFailed {
				section: failure.error.section.clone(),
				method: failure.error.method.clone(),
				docs: failure.error.docs.clone(),
			}),
			None => Ok(self),
		}
	}

	pub fn find_event(&self, section: &str, method: &str) -> Option<&ChainEvent> {
		self.events
			.iter()
			.map(|record| &record.event)
			.find(|event| event.is(section, method))
	}
}

/// Dispatch failures reported in a block's events.
pub fn classify_failures(events: &EventBatch) -> Vec<DispatchFailure> {
	events
		.iter()
		.filter_map(|record| match &record.event {
			ChainEvent::ExtrinsicFailed { error } => Some(DispatchFailure {
				call_index: None,
				error: error.to_module_error(),
			}),
			ChainEvent::BatchInterrupted { index, error } => Some(DispatchFailure {
				call_index: Some(*index),
				error: error.to_module_error(),
			}),
			ChainEvent::ProxyExecuted {
				result: Err(error),
			} => Some(DispatchFailure {
				call_index: None,
				error: error.to_module_error(),
			}),
			_ => None,
		})
		.collect()
}

#[derive(Default)]
pub struct BatchSubmitter {
	wait_for: WaitFor,
	event_bus: Option<EventBus>,
}

impl BatchSubmitter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_wait_for(mut self, wait_for: WaitFor) -> Self {
		self.wait_for = wait_for;
		self
	}

	pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
		self.event_bus = Some(event_bus);
		self
	}

	fn publish(&self, event: SchedulerEvent) {
		if let Some(bus) = &self.event_bus {
			let _ = bus.publish(event);
		}
	}

	/// Signs `calls` with `signer` and submits them to `chain` as one unit.
	pub async fn submit(
		&self,
		chain: &ChainHandle,
		mut calls: Vec<UnsignedCall>,
		signer: &AccountService,
	) -> Result<SubmissionOutcome> {
		let count = calls.len();
		let call = match count {
			0 => return Err(SchedulerError::EmptyBatch),
			1 => calls.remove(0),
			_ => chain.build_call(RuntimeCall::Batch { calls }).await?,
		};

		let signer_account = signer
			.get_address()
			.await
			.map_err(|e| SchedulerError::Signing(e.to_string()))?;
		let signature = signer
			.sign(&call.encoded)
			.await
			.map_err(|e| SchedulerError::Signing(e.to_string()))?;

		info!(
			chain = %chain.name(),
			signer = %signer_account,
			call = %call.method,
			calls = count,
			"Submitting batch"
		);
		self.publish(SchedulerEvent::BatchSubmitted {
			chain: chain.name().to_string(),
			calls: count,
		});

		let mut statuses = chain
			.submit(SignedCall {
				call,
				signer: signer_account,
				signature,
			})
			.await?;

		let mut included: Option<(H256, EventBatch)> = None;
		while let Some(status) = statuses.next().await {
			match status {
				TxStatus::Ready | TxStatus::Broadcast => {
					debug!(chain = %chain.name(), ?status, "Submission progressed");
				}
				TxStatus::InBlock { block_hash, events } => {
					info!(chain = %chain.name(), %block_hash, "Batch in block");
					self.publish(SchedulerEvent::BatchInBlock {
						chain: chain.name().to_string(),
						block_hash,
					});
					if self.wait_for == WaitFor::InBlock {
						return Ok(self.outcome(chain, block_hash, events, false));
					}
					included = Some((block_hash, events));
				}
				TxStatus::Finalized { block_hash, events } => {
					info!(chain = %chain.name(), %block_hash, "Batch finalized");
					self.publish(SchedulerEvent::BatchFinalized {
						chain: chain.name().to_string(),
						block_hash,
					});
					return Ok(self.outcome(chain, block_hash, events, true));
				}
				TxStatus::Retracted => {
					warn!(chain = %chain.name(), "Block containing batch was retracted");
					included = None;
				}
				TxStatus::Invalid(reason) => {
					warn!(chain = %chain.name(), %reason, "Batch rejected");
					return Err(SchedulerError::SubmissionRejected(reason));
				}
				TxStatus::Dropped | TxStatus::Usurped => {
					warn!(chain = %chain.name(), ?status, "Batch dropped from the pool");
					return Err(SchedulerError::SubmissionRejected(format!("{:?}", status)));
				}
			}
		}

		match included {
			Some((block_hash, events)) => {
				warn!(
					chain = %chain.name(),
					%block_hash,
					"Status stream ended before finality"
				);
				Ok(self.outcome(chain, block_hash, events, false))
			}
			None => Err(SchedulerError::SubmissionRejected(
				"status stream ended before inclusion".to_string(),
			)),
		}
	}

	fn outcome(
		&self,
		chain: &ChainHandle,
		block_hash: H256,
		events: EventBatch,
		finalized: bool,
	) -> SubmissionOutcome {
		let failures = classify_failures(&events);
		for failure in &failures {
			warn!(
				chain = %chain.name(),
				call_index = ?failure.call_index,
				error = %failure.error,
				"Call failed after inclusion"
			);
			self.publish(SchedulerEvent::DispatchFailed {
				chain: chain.name().to_string(),
				error: failure.error.clone(),
			});
		}
		SubmissionOutcome {
			block_hash,
			finalized,
			events,
			failures,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use scheduler_account::{AccountError, AccountInterface};
	use scheduler_chains::InMemoryChain;
	use scheduler_types::{Account, AccountFormat, CallMethod, Signature};
	use std::sync::Arc;

	const OWNER: Account = Account::Id32([1u8; 32]);
	const BOB: Account = Account::Id32([2u8; 32]);

	struct FixedSigner(Account);

	#[async_trait]
	impl AccountInterface for FixedSigner {
		async fn address(&self) -> std::result::Result<Account, AccountError> {
			Ok(self.0)
		}

		async fn sign(&self, payload: &[u8]) -> std::result::Result<Signature, AccountError> {
			Ok(Signature(payload.iter().rev().copied().collect()))
		}
	}

	fn signer() -> AccountService {
		AccountService::new(Box::new(FixedSigner(OWNER)))
	}

	async fn transfers(chain: &ChainHandle, values: &[u128]) -> Vec<UnsignedCall> {
		let mut calls = Vec::new();
		for value in values {
			calls.push(
				chain
					.build_call(RuntimeCall::Transfer {
						dest: BOB,
						value: *value,
					})
					.await
					.unwrap(),
			);
		}
		calls
	}

	fn chain() -> (Arc<InMemoryChain>, ChainHandle) {
		let chain = Arc::new(InMemoryChain::new("shibuya", 2000, AccountFormat::AccountId32));
		chain.set_balance(OWNER, 100);
		let handle: ChainHandle = chain.clone();
		(chain, handle)
	}

	#[tokio::test]
	async fn test_multiple_calls_are_batched() {
		let (chain, handle) = chain();
		let calls = transfers(&handle, &[10, 20]).await;
		let outcome = BatchSubmitter::new()
			.submit(&handle, calls, &signer())
			.await
			.unwrap();

		assert!(outcome.finalized);
		assert!(outcome.is_success());
		assert!(outcome.find_event("utility", "BatchCompleted").is_some());
		let submitted = chain.submissions();
		assert_eq!(submitted.len(), 1);
		assert_eq!(submitted[0].call.method, CallMethod::new("utility", "batch"));
		assert_eq!(submitted[0].signer, OWNER);
		assert_eq!(chain.free_balance_of(&BOB), 30);
	}

	#[tokio::test]
	async fn test_single_call_is_not_wrapped() {
		let (chain, handle) = chain();
		let calls = transfers(&handle, &[10]).await;
		BatchSubmitter::new()
			.submit(&handle, calls, &signer())
			.await
			.unwrap();
		assert_eq!(
			chain.submissions()[0].call.method,
			CallMethod::new("balances", "transfer")
		);
	}

	#[tokio::test]
	async fn test_interrupted_batch_reports_failure() {
		let (chain, handle) = chain();
		let calls = transfers(&handle, &[10, 500, 1]).await;
		let outcome = BatchSubmitter::new()
			.submit(&handle, calls, &signer())
			.await
			.unwrap();

		assert_eq!(outcome.failures.len(), 1);
		assert_eq!(outcome.failures[0].call_index, Some(1));
		assert_eq!(outcome.failures[0].error.docs, "Balance too low to send value.");
		// calls before the failing one stay applied
		assert_eq!(chain.free_balance_of(&BOB), 10);

		match outcome.into_result() {
			Err(SchedulerError::ModuleDispatchFailed { section, method, .. }) => {
				assert_eq!(section, "balances");
				assert_eq!(method, "InsufficientBalance");
			}
			other => panic!("unexpected result {:?}", other.map(|o| o.block_hash)),
		}
	}

	#[tokio::test]
	async fn test_injected_module_error_is_decoded() {
		let (chain, handle) = chain();
		chain.fail_next_call(
			CallMethod::new("balances", "transfer"),
			ModuleError::new(
				"balances",
				"LiquidityRestrictions",
				"Account liquidity restrictions prevent withdrawal.",
			),
		);
		let calls = transfers(&handle, &[10]).await;
		let outcome = BatchSubmitter::new()
			.submit(&handle, calls, &signer())
			.await
			.unwrap();
		assert_eq!(outcome.failures[0].call_index, None);
		assert_eq!(outcome.failures[0].error.method, "LiquidityRestrictions");
	}

	#[tokio::test]
	async fn test_rejection_before_inclusion() {
		let (chain, handle) = chain();
		chain.reject_next_submission("Inability to pay some fees");
		let calls = transfers(&handle, &[10]).await;
		let err = BatchSubmitter::new()
			.submit(&handle, calls, &signer())
			.await
			.unwrap_err();
		assert!(matches!(err, SchedulerError::SubmissionRejected(ref r) if r == "Inability to pay some fees"));
		assert!(!err.is_retryable());
	}

	#[tokio::test]
	async fn test_stream_ending_before_finality() {
		let (chain, handle) = chain();
		chain.hold_finality(true);
		let calls = transfers(&handle, &[10]).await;
		let outcome = BatchSubmitter::new()
			.submit(&handle, calls, &signer())
			.await
			.unwrap();
		assert!(!outcome.finalized);
	}

	#[tokio::test]
	async fn test_wait_for_in_block_and_events() {
		let (_chain, handle) = chain();
		let bus = EventBus::new(16);
		let mut rx = bus.subscribe();
		let calls = transfers(&handle, &[10]).await;
		let outcome = BatchSubmitter::new()
			.with_wait_for(WaitFor::InBlock)
			.with_event_bus(bus)
			.submit(&handle, calls, &signer())
			.await
			.unwrap();
		assert!(!outcome.finalized);

		assert!(matches!(rx.recv().await.unwrap(), SchedulerEvent::BatchSubmitted { calls: 1, .. }));
		assert!(matches!(rx.recv().await.unwrap(), SchedulerEvent::BatchInBlock { .. }));
	}

	#[tokio::test]
	async fn test_empty_batch() {
		let (_chain, handle) = chain();
		let err = BatchSubmitter::new()
			.submit(&handle, Vec::new(), &signer())
			.await
			.unwrap_err();
		assert!(matches!(err, SchedulerError::EmptyBatch));
	}
}

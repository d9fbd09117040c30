//! Error taxonomy shared across the scheduler.
//!
//! Pure computation errors (`InvalidAccountLength`, `WeightOverflow`,
//! `InvalidFeeRate`) are never retried. Chain errors surface to the caller, who
//! decides on retry. A correlation that times out is not an error at all and
//! has no variant here.

use thiserror::Error;

/// Failures reported by a chain client while talking to its chain.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
	#[error("Connection error: {0}")]
	Connection(String),
	#[error("Query failed: {0}")]
	Query(String),
	#[error("Unexpected storage value for {query}: {found}")]
	UnexpectedValue { query: String, found: String },
	#[error("Call construction failed: {0}")]
	CallBuild(String),
	#[error("Submission failed: {0}")]
	Submission(String),
	#[error("Chain client is closed")]
	Closed,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("Invalid account length: expected 20 or 32 bytes, got {0}")]
	InvalidAccountLength(usize),

	#[error("Weight overflow while computing {0}")]
	WeightOverflow(&'static str),

	#[error("Invalid fee rate: time units per second must be non-zero")]
	InvalidFeeRate,

	#[error("Provisioning query failed on {chain}: {source}")]
	ProvisioningQueryFailed {
		chain: String,
		#[source]
		source: ChainError,
	},

	#[error("Submission rejected before inclusion: {0}")]
	SubmissionRejected(String),

	#[error("Dispatch failed: {section}.{method}: {docs}")]
	ModuleDispatchFailed {
		section: String,
		method: String,
		docs: String,
	},

	#[error("Asset not registered on {chain}: {asset}")]
	UnknownAsset { chain: String, asset: String },

	#[error("Cannot submit an empty batch")]
	EmptyBatch,

	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),

	#[error("Signing error: {0}")]
	Signing(String),

	#[error("Configuration error: {0}")]
	Config(String),
}

impl SchedulerError {
	/// Whether the caller may reasonably retry the failed operation.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			Self::ProvisioningQueryFailed { .. }
				| Self::Chain(ChainError::Connection(_) | ChainError::Query(_))
		)
	}
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

use scheduler_account::AccountError;
use scheduler_types::{ChainError, SchedulerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
	#[error("Configuration error: {0}")]
	Configuration(String),

	#[error(transparent)]
	Scheduler(#[from] SchedulerError),

	#[error("Chain error: {0}")]
	Chain(#[from] ChainError),

	#[error("Account error: {0}")]
	Account(#[from] AccountError),

	#[error("Lifecycle error: {0}")]
	Lifecycle(String),
}

impl CoreError {
	/// Whether the caller may reasonably retry the failed operation.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Scheduler(e) => e.is_retryable(),
			Self::Chain(ChainError::Connection(_) | ChainError::Query(_)) => true,
			_ => false,
		}
	}
}

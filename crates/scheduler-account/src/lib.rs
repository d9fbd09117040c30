//! Signing accounts.
//!
//! The scheduler never stores key material. Callers hand it an
//! `AccountService` per operation, wrapping whichever `AccountInterface`
//! implementation holds the key.

pub mod implementations;

pub use implementations::local::LocalWallet;

use async_trait::async_trait;
use scheduler_types::{Account, Signature};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Provider error: {0}")]
	Provider(String),
}

/// A signer bound to exactly one account.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	async fn address(&self) -> Result<Account, AccountError>;
	/// Signs the encoded call bytes.
	async fn sign(&self, payload: &[u8]) -> Result<Signature, AccountError>;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<Account, AccountError> {
		self.provider.address().await
	}

	pub async fn sign(&self, payload: &[u8]) -> Result<Signature, AccountError> {
		self.provider.sign(payload).await
	}
}

//! Local private-key wallet for Ethereum-style (`AccountKey20`) chains.

use crate::{AccountError, AccountInterface};
use alloy::primitives::keccak256;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use scheduler_types::{blake2_256, Account, Signature};

/// Payloads longer than this are hashed with blake2-256 before signing.
const MAX_UNHASHED_PAYLOAD: usize = 256;

/// Local wallet using Alloy's secp256k1 signer.
///
/// Suitable for development chains and tests. The account is the 20-byte
/// Ethereum address of the key.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a wallet from a hex-encoded private key, with or without `0x`.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let key = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
		if key.len() != 64 || hex::decode(key).is_err() {
			return Err(AccountError::InvalidKey(
				"Private key must be 64 hex characters (32 bytes)".to_string(),
			));
		}

		let signer = key
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}

	pub fn account(&self) -> Account {
		let address = self.signer.address();
		Account::Key20(address.0.0)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	async fn address(&self) -> Result<Account, AccountError> {
		Ok(self.account())
	}

	async fn sign(&self, payload: &[u8]) -> Result<Signature, AccountError> {
		let digest = if payload.len() > MAX_UNHASHED_PAYLOAD {
			keccak256(blake2_256(payload))
		} else {
			keccak256(payload)
		};

		let signature = self
			.signer
			.sign_hash(&digest)
			.await
			.map_err(|e| AccountError::SigningFailed(format!("Failed to sign payload: {}", e)))?;

		Ok(Signature(signature.as_bytes().to_vec()))
	}
}

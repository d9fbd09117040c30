//! Account identifiers and signatures.
//!
//! An account is a fixed-length byte identifier whose length follows the
//! chain's account format: 32 bytes for `AccountId32` chains, 20 bytes for
//! Ethereum-style `AccountKey20` chains.

use crate::errors::{Result, SchedulerError};
use codec::{Encode, Output};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Account format used by a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountFormat {
	AccountId32,
	AccountKey20,
}

impl AccountFormat {
	/// Byte length of accounts in this format.
	pub fn byte_len(&self) -> usize {
		match self {
			Self::AccountId32 => 32,
			Self::AccountKey20 => 20,
		}
	}

	/// Runtime type name, as it appears inside derivation preimages.
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::AccountId32 => "AccountId32",
			Self::AccountKey20 => "AccountKey20",
		}
	}
}

impl fmt::Display for AccountFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.type_name())
	}
}

impl FromStr for AccountFormat {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"account_id32" | "AccountId32" | "id32" => Ok(Self::AccountId32),
			"account_key20" | "AccountKey20" | "key20" => Ok(Self::AccountKey20),
			other => Err(format!("unknown account format '{}'", other)),
		}
	}
}

/// An on-chain account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Account {
	Id32([u8; 32]),
	Key20([u8; 20]),
}

impl Account {
	/// Builds an account from raw bytes, inferring the format from the length.
	pub fn from_slice(bytes: &[u8]) -> Result<Self> {
		match bytes.len() {
			32 => {
				let mut id = [0u8; 32];
				id.copy_from_slice(bytes);
				Ok(Self::Id32(id))
			}
			20 => {
				let mut key = [0u8; 20];
				key.copy_from_slice(bytes);
				Ok(Self::Key20(key))
			}
			len => Err(SchedulerError::InvalidAccountLength(len)),
		}
	}

	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Self::Id32(id) => id,
			Self::Key20(key) => key,
		}
	}

	pub fn format(&self) -> AccountFormat {
		match self {
			Self::Id32(_) => AccountFormat::AccountId32,
			Self::Key20(_) => AccountFormat::AccountKey20,
		}
	}
}

impl fmt::Display for Account {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.as_bytes()))
	}
}

impl fmt::Debug for Account {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Account({})", self)
	}
}

impl FromStr for Account {
	type Err = SchedulerError;

	fn from_str(s: &str) -> Result<Self> {
		let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
			.map_err(|e| SchedulerError::Config(format!("invalid account hex: {}", e)))?;
		Self::from_slice(&bytes)
	}
}

/// Accounts encode as their raw bytes, with no length prefix.
impl Encode for Account {
	fn size_hint(&self) -> usize {
		self.as_bytes().len()
	}

	fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
		dest.write(self.as_bytes());
	}
}

impl Serialize for Account {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for Account {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Signature bytes produced by a signer over an encoded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

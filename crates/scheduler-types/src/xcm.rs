//! Versioned XCM structures.
//!
//! Only the subset the scheduler builds is modelled. Variant indices follow
//! the runtime's SCALE layout so that `Encode` output is byte-compatible with
//! what the chains decode.

use crate::weight::Weight;
use codec::Encode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod v2 {
	use super::*;

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum NetworkId {
		#[codec(index = 0)]
		Any,
		#[codec(index = 1)]
		Named(Vec<u8>),
		#[codec(index = 2)]
		Polkadot,
		#[codec(index = 3)]
		Kusama,
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum Junction {
		#[codec(index = 0)]
		Parachain(#[codec(compact)] u32),
		#[codec(index = 1)]
		AccountId32 { network: NetworkId, id: [u8; 32] },
		#[codec(index = 2)]
		AccountIndex64 {
			network: NetworkId,
			#[codec(compact)]
			index: u64,
		},
		#[codec(index = 3)]
		AccountKey20 { network: NetworkId, key: [u8; 20] },
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum Junctions {
		#[codec(index = 0)]
		Here,
		#[codec(index = 1)]
		X1(Junction),
		#[codec(index = 2)]
		X2(Junction, Junction),
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub struct MultiLocation {
		pub parents: u8,
		pub interior: Junctions,
	}
}

pub mod v3 {
	use super::*;

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum NetworkId {
		#[codec(index = 0)]
		ByGenesis([u8; 32]),
		#[codec(index = 1)]
		ByFork {
			block_number: u64,
			block_hash: [u8; 32],
		},
		#[codec(index = 2)]
		Polkadot,
		#[codec(index = 3)]
		Kusama,
		#[codec(index = 4)]
		Westend,
		#[codec(index = 5)]
		Rococo,
		#[codec(index = 6)]
		Wococo,
		#[codec(index = 7)]
		Ethereum {
			#[codec(compact)]
			chain_id: u64,
		},
		#[codec(index = 8)]
		BitcoinCore,
		#[codec(index = 9)]
		BitcoinCash,
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum Junction {
		#[codec(index = 0)]
		Parachain(#[codec(compact)] u32),
		#[codec(index = 1)]
		AccountId32 {
			network: Option<NetworkId>,
			id: [u8; 32],
		},
		#[codec(index = 2)]
		AccountIndex64 {
			network: Option<NetworkId>,
			#[codec(compact)]
			index: u64,
		},
		#[codec(index = 3)]
		AccountKey20 {
			network: Option<NetworkId>,
			key: [u8; 20],
		},
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum Junctions {
		#[codec(index = 0)]
		Here,
		#[codec(index = 1)]
		X1(Junction),
		#[codec(index = 2)]
		X2(Junction, Junction),
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub struct MultiLocation {
		pub parents: u8,
		pub interior: Junctions,
	}

	impl MultiLocation {
		pub fn here() -> Self {
			Self {
				parents: 0,
				interior: Junctions::Here,
			}
		}

		/// A sibling parachain, seen from another parachain.
		pub fn sibling(para_id: u32) -> Self {
			Self {
				parents: 1,
				interior: Junctions::X1(Junction::Parachain(para_id)),
			}
		}

		/// The para id of a sibling location, if this is one.
		pub fn sibling_para_id(&self) -> Option<u32> {
			match (&self.parents, &self.interior) {
				(1, Junctions::X1(Junction::Parachain(id)))
				| (1, Junctions::X2(Junction::Parachain(id), _)) => Some(*id),
				_ => None,
			}
		}
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum AssetId {
		#[codec(index = 0)]
		Concrete(MultiLocation),
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum Fungibility {
		#[codec(index = 0)]
		Fungible(#[codec(compact)] u128),
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub struct MultiAsset {
		pub id: AssetId,
		pub fun: Fungibility,
	}

	impl MultiAsset {
		pub fn fungible(location: MultiLocation, amount: u128) -> Self {
			Self {
				id: AssetId::Concrete(location),
				fun: Fungibility::Fungible(amount),
			}
		}
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum WeightLimit {
		#[codec(index = 0)]
		Unlimited,
		#[codec(index = 1)]
		Limited(Weight),
	}

	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum OriginKind {
		#[codec(index = 0)]
		Native,
		#[codec(index = 1)]
		SovereignAccount,
		#[codec(index = 2)]
		Superuser,
		#[codec(index = 3)]
		Xcm,
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub enum Instruction {
		#[codec(index = 0)]
		WithdrawAsset(Vec<MultiAsset>),
		#[codec(index = 6)]
		Transact {
			origin_kind: OriginKind,
			require_weight_at_most: Weight,
			call: Vec<u8>,
		},
		#[codec(index = 19)]
		BuyExecution {
			fees: MultiAsset,
			weight_limit: WeightLimit,
		},
	}

	#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
	pub struct Xcm(pub Vec<Instruction>);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
pub enum VersionedMultiLocation {
	#[codec(index = 1)]
	V2(v2::MultiLocation),
	#[codec(index = 3)]
	V3(v3::MultiLocation),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
pub enum VersionedMultiAsset {
	#[codec(index = 3)]
	V3(v3::MultiAsset),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Serialize, Deserialize)]
pub enum VersionedXcm {
	#[codec(index = 3)]
	V3(v3::Xcm),
}

/// Location layout used for the multilocation-hash derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationVersion {
	V2,
	V3,
}

impl FromStr for LocationVersion {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"v2" => Ok(Self::V2),
			"v3" => Ok(Self::V3),
			other => Err(format!("unknown location version '{}'", other)),
		}
	}
}

/// Relay network tag carried in account junctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
	Any,
	Polkadot,
	Kusama,
	Westend,
	Rococo,
	Wococo,
}

impl Network {
	fn name(&self) -> &'static str {
		match self {
			Self::Any => "any",
			Self::Polkadot => "polkadot",
			Self::Kusama => "kusama",
			Self::Westend => "westend",
			Self::Rococo => "rococo",
			Self::Wococo => "wococo",
		}
	}

	pub fn to_v3(self) -> Option<v3::NetworkId> {
		match self {
			Self::Any => None,
			Self::Polkadot => Some(v3::NetworkId::Polkadot),
			Self::Kusama => Some(v3::NetworkId::Kusama),
			Self::Westend => Some(v3::NetworkId::Westend),
			Self::Rococo => Some(v3::NetworkId::Rococo),
			Self::Wococo => Some(v3::NetworkId::Wococo),
		}
	}

	/// XCM v2 has no discriminant for the test relays; they travel as `Named`.
	pub fn to_v2(self) -> v2::NetworkId {
		match self {
			Self::Any => v2::NetworkId::Any,
			Self::Polkadot => v2::NetworkId::Polkadot,
			Self::Kusama => v2::NetworkId::Kusama,
			other => v2::NetworkId::Named(other.name().as_bytes().to_vec()),
		}
	}
}

impl fmt::Display for Network {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for Network {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"any" => Ok(Self::Any),
			"polkadot" => Ok(Self::Polkadot),
			"kusama" => Ok(Self::Kusama),
			"westend" => Ok(Self::Westend),
			"rococo" => Ok(Self::Rococo),
			"wococo" => Ok(Self::Wococo),
			other => Err(format!("unknown network '{}'", other)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sibling_location_encoding() {
		// V3 { parents: 1, X1(Parachain(2000)) }
		let location = VersionedMultiLocation::V3(v3::MultiLocation::sibling(2000));
		assert_eq!(hex::encode(location.encode()), "03010100411f");
	}

	#[test]
	fn test_envelope_instruction_indices() {
		let asset = v3::MultiAsset::fungible(v3::MultiLocation::sibling(2000), 10);
		let xcm = VersionedXcm::V3(v3::Xcm(vec![
			v3::Instruction::WithdrawAsset(vec![asset.clone()]),
			v3::Instruction::BuyExecution {
				fees: asset,
				weight_limit: v3::WeightLimit::Unlimited,
			},
			v3::Instruction::Transact {
				origin_kind: v3::OriginKind::SovereignAccount,
				require_weight_at_most: Weight::new(1, 1),
				call: vec![0xaa],
			},
		]));
		let encoded = xcm.encode();
		// version 3, three instructions
		assert_eq!(&encoded[..2], &[3, 12]);
		// WithdrawAsset with one asset
		assert_eq!(&encoded[2..4], &[0, 4]);
		let transact = [6u8, 1, 4, 4, 4, 0xaa];
		assert!(encoded.ends_with(&transact));
		let buy_execution_index = encoded.len() - transact.len() - 10;
		assert_eq!(encoded[buy_execution_index], 19);
	}

	#[test]
	fn test_network_v2_fallback_is_named() {
		assert_eq!(Network::Polkadot.to_v2(), v2::NetworkId::Polkadot);
		assert_eq!(
			Network::Rococo.to_v2(),
			v2::NetworkId::Named(b"rococo".to_vec())
		);
		assert_eq!(Network::Any.to_v3(), None);
		assert_eq!("Rococo".parse::<Network>().unwrap(), Network::Rococo);
	}
}

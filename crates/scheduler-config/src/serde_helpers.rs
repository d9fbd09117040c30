//! Serde helpers for configuration deserialization

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

/// Token amounts and weights routinely exceed TOML's signed 64-bit integers,
/// so they are written as decimal strings. Small values may still be plain
/// integers.
pub mod amount {
	use super::*;

	pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_str(value)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
	where
		D: Deserializer<'de>,
	{
		deserializer.deserialize_any(AmountVisitor)
	}
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
	type Value = u128;

	fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("a non-negative integer or a decimal string")
	}

	fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
		Ok(v as u128)
	}

	fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
		Ok(v)
	}

	fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
		u128::try_from(v).map_err(|_| E::custom(format!("amount must be non-negative, got {}", v)))
	}

	fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
		v.trim()
			.replace('_', "")
			.parse::<u128>()
			.map_err(|e| E::custom(format!("invalid amount '{}': {}", v, e)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::{Deserialize, Serialize};

	#[derive(Debug, Deserialize, Serialize, PartialEq)]
	struct TestStruct {
		#[serde(with = "amount")]
		value: u128,
	}

	#[test]
	fn test_amount_from_string_and_integer() {
		let parsed: TestStruct = toml::from_str(r#"value = "10_000_000_000_000_000_000""#).unwrap();
		assert_eq!(parsed.value, 10_000_000_000_000_000_000);

		let parsed: TestStruct = toml::from_str("value = 42").unwrap();
		assert_eq!(parsed.value, 42);

		assert!(toml::from_str::<TestStruct>("value = -1").is_err());
		assert!(toml::from_str::<TestStruct>(r#"value = "ten""#).is_err());
	}

	#[test]
	fn test_amount_serializes_as_string() {
		let json = serde_json::to_string(&TestStruct { value: u128::MAX }).unwrap();
		assert_eq!(json, format!("{{\"value\":\"{}\"}}", u128::MAX));
	}
}

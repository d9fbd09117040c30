//! Registry of open chain handles.
//!
//! Handles are registered once after they are opened and closed together by
//! `close_all`. The registry itself is not synchronised; share it behind a
//! lock if several owners need to mutate it.

use scheduler_types::{ChainError, ChainHandle, Result, SchedulerError};
use std::collections::HashMap;
use tracing::{info, warn};

pub struct ChainRegistry {
	chains: HashMap<String, ChainHandle>,
}

impl Default for ChainRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl ChainRegistry {
	pub fn new() -> Self {
		Self {
			chains: HashMap::new(),
		}
	}

	/// Registers a chain handle under its name.
	///
	/// # Errors
	///
	/// Returns an error if a chain with the same name is already registered.
	pub fn register(&mut self, chain: ChainHandle) -> Result<()> {
		let name = chain.name().to_string();
		info!("Registering chain {}", name);

		if self.chains.contains_key(&name) {
			return Err(SchedulerError::Config(format!(
				"Chain {} already registered",
				name
			)));
		}

		self.chains.insert(name, chain);
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<ChainHandle> {
		self.chains.get(name).cloned()
	}

	/// Like `get`, but a missing chain is an error.
	pub fn get_required(&self, name: &str) -> Result<ChainHandle> {
		self.get(name).ok_or_else(|| {
			SchedulerError::Chain(ChainError::Connection(format!(
				"Chain {} not configured",
				name
			)))
		})
	}

	/// Registered chain names, in no particular order.
	pub fn chains(&self) -> Vec<String> {
		self.chains.keys().cloned().collect()
	}

	/// Closes every registered handle and empties the registry.
	pub async fn close_all(&mut self) {
		for (name, chain) in self.chains.drain() {
			if let Err(e) = chain.close().await {
				warn!("Failed to close chain {}: {}", name, e);
			} else {
				info!("Closed chain {}", name);
			}
		}
	}
}

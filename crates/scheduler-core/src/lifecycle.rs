//! Start/stop state of the engine's background task sync.

use crate::error::CoreError;
use std::fmt;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	Starting,
	Running,
	Stopping,
	Stopped,
	Failed,
}

impl fmt::Display for EngineState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Idle => write!(f, "Idle"),
			Self::Starting => write!(f, "Starting"),
			Self::Running => write!(f, "Running"),
			Self::Stopping => write!(f, "Stopping"),
			Self::Stopped => write!(f, "Stopped"),
			Self::Failed => write!(f, "Failed"),
		}
	}
}

impl EngineState {
	fn allows(self, next: EngineState) -> bool {
		use EngineState::*;

		matches!(
			(self, next),
			(Idle, Starting)
				| (Stopped, Starting)
				| (Failed, Starting)
				| (Starting, Running)
				| (Running, Stopping)
				| (Stopping, Stopped)
				| (Starting | Running | Stopping, Failed)
		)
	}
}

pub struct Lifecycle {
	state: RwLock<EngineState>,
	shutdown_tx: broadcast::Sender<()>,
}

impl Lifecycle {
	pub fn new() -> Self {
		let (shutdown_tx, _) = broadcast::channel(4);
		Self {
			state: RwLock::new(EngineState::Idle),
			shutdown_tx,
		}
	}

	pub async fn state(&self) -> EngineState {
		*self.state.read().await
	}

	pub async fn transition(&self, next: EngineState) -> Result<(), CoreError> {
		let mut state = self.state.write().await;
		let current = *state;
		if !current.allows(next) {
			return Err(CoreError::Lifecycle(format!(
				"cannot go from {} to {}",
				current, next
			)));
		}
		*state = next;
		info!(from = %current, to = %next, "Engine state changed");
		Ok(())
	}

	/// Moves to `Stopping`, tells every shutdown subscriber, then `Stopped`.
	pub async fn stop(&self) -> Result<(), CoreError> {
		self.transition(EngineState::Stopping).await?;
		let _ = self.shutdown_tx.send(());
		self.transition(EngineState::Stopped).await
	}

	pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
		self.shutdown_tx.subscribe()
	}

	pub async fn is_running(&self) -> bool {
		self.state().await == EngineState::Running
	}
}

impl Default for Lifecycle {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_start_stop_restart() {
		let lifecycle = Lifecycle::new();
		assert!(lifecycle.transition(EngineState::Running).await.is_err());

		lifecycle.transition(EngineState::Starting).await.unwrap();
		lifecycle.transition(EngineState::Running).await.unwrap();
		assert!(lifecycle.is_running().await);

		let mut shutdown = lifecycle.subscribe_shutdown();
		lifecycle.stop().await.unwrap();
		assert!(shutdown.recv().await.is_ok());
		assert_eq!(lifecycle.state().await, EngineState::Stopped);

		lifecycle.transition(EngineState::Starting).await.unwrap();
	}

	#[tokio::test]
	async fn test_stop_requires_running() {
		let lifecycle = Lifecycle::new();
		assert!(matches!(
			lifecycle.stop().await,
			Err(CoreError::Lifecycle(_))
		));
	}
}

//! Configuration loading for the scheduler.
//!
//! Configuration is read from a TOML, JSON or YAML file, `${VAR}` references
//! are substituted from the environment, a few well-known settings can be
//! overridden by `SCHEDULER_*` variables, and the result is validated.

pub mod serde_helpers;
pub mod types;

pub use types::*;

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// File formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
	Toml,
	Json,
	Yaml,
}

impl ConfigFormat {
	pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
		match path.extension().and_then(|s| s.to_str()) {
			Some("toml") => Ok(Self::Toml),
			Some("json") => Ok(Self::Json),
			Some("yaml") | Some("yml") => Ok(Self::Yaml),
			_ => Err(ConfigError::ParseError(format!(
				"Unsupported config format: {}",
				path.display()
			))),
		}
	}
}

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "SCHEDULER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<SchedulerConfig, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {}", file_path);

		let path = Path::new(file_path);
		if !path.exists() {
			return Err(ConfigError::FileNotFound(file_path.clone()));
		}
		let format = ConfigFormat::from_path(path)?;
		let content = tokio::fs::read_to_string(path).await?;

		let mut config = self.parse(&content, format)?;
		self.apply_env_overrides(&mut config)?;
		validate_config(&config)?;

		Ok(config)
	}

	/// Parses configuration text after substituting environment variables.
	pub fn parse(&self, content: &str, format: ConfigFormat) -> Result<SchedulerConfig, ConfigError> {
		let content = substitute_env_vars(content)?;
		match format {
			ConfigFormat::Toml => {
				toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
			}
			ConfigFormat::Json => {
				serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
			}
			ConfigFormat::Yaml => {
				serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
			}
		}
	}

	fn apply_env_overrides(&self, config: &mut SchedulerConfig) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.engine.log_level = log_level;
		}

		if let Ok(endpoint) = env::var(format!("{}EXECUTION_ENDPOINT", self.env_prefix)) {
			debug!("Overriding execution chain endpoint from environment");
			config.chains.execution.endpoint = endpoint;
		}

		if let Ok(endpoint) = env::var(format!("{}CONTROL_ENDPOINT", self.env_prefix)) {
			debug!("Overriding control chain endpoint from environment");
			config.chains.control.endpoint = endpoint;
		}

		Ok(())
	}
}

/// Replaces every `${VAR_NAME}` with the variable's value.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

pub fn validate_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
	let chains = &config.chains;

	for chain in [&chains.execution, &chains.control] {
		if chain.endpoint.trim().is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"Chain '{}' has no endpoint",
				chain.name
			)));
		}
	}

	if chains.execution.para_id == chains.control.para_id {
		return Err(ConfigError::ValidationError(format!(
			"Execution and control chains share para id {}",
			chains.execution.para_id
		)));
	}

	if config.weights.ref_time_per_second == 0 {
		return Err(ConfigError::ValidationError(
			"weights.ref_time_per_second must be non-zero".to_string(),
		));
	}

	if config.task.expiry_days == 0 {
		return Err(ConfigError::ValidationError(
			"task.expiry_days must be at least 1".to_string(),
		));
	}

	Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scheduler_config::{ConfigLoader, SchedulerConfig};
use scheduler_types::xcm::{LocationVersion, Network};
use scheduler_types::{Account, AssetPair, TriggerFunction, Weight};
use scheduler_xcm::{derive, DerivationScheme, WeightFeeCalculator};
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod simulation;

#[derive(Parser)]
#[command(name = "xcm-scheduler")]
#[command(about = "Cross-chain price task scheduler", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[arg(short, long, value_name = "FILE", default_value = "config/scheduler.toml")]
	config: PathBuf,

	#[arg(long, env = "SCHEDULER_LOG_LEVEL", default_value = "info")]
	log_level: String,

	/// Emit logs as JSON lines
	#[arg(long, env = "SCHEDULER_JSON_LOGS")]
	json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Validate the configuration file
	Validate,
	/// Derive an owner's account as seen by another parachain
	Derive {
		/// Owner account, hex encoded (20 or 32 bytes)
		owner: Account,
		/// Parachain the owner's messages come from
		#[arg(long)]
		para_id: u32,
		#[arg(long, value_enum, default_value_t = Scheme::V3)]
		scheme: Scheme,
		/// Relay network for the v2 scheme
		#[arg(long, default_value = "any")]
		network: Network,
		/// Location layout for the v2 scheme
		#[arg(long, default_value = "v3")]
		location_version: LocationVersion,
	},
	/// Overall XCM weight and fee for a call weight, using the configured weights
	Fee {
		#[arg(long)]
		ref_time: u128,
		#[arg(long, default_value_t = 0)]
		proof_size: u128,
		/// Fee charged per second of ref time
		#[arg(long)]
		fee_per_second: u128,
		#[arg(long, value_enum, default_value_t = Side::Execution)]
		side: Side,
	},
	/// Schedule, trigger and track one task on in-memory chains
	Simulate {
		/// Owner key, hex encoded secp256k1
		#[arg(long, env = "SCHEDULER_PRIVATE_KEY")]
		private_key: String,
		#[arg(long)]
		beneficiary: Account,
		#[arg(long, default_value_t = 1_000_000_000)]
		amount: u128,
		#[arg(long, default_value = "WRSTR")]
		base: String,
		#[arg(long, default_value = "USDT")]
		quote: String,
		/// `gt` or `lt`
		#[arg(long, default_value = "gt")]
		trigger: TriggerFunction,
		#[arg(long, default_value_t = 100)]
		threshold: u128,
		#[arg(long, default_value_t = 416_000_000_000)]
		fee_per_second: u128,
		/// Keep the process alive after the run until interrupted
		#[arg(long)]
		hold: bool,
	},
}

#[derive(Clone, Copy, ValueEnum)]
enum Scheme {
	V2,
	V3,
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
	Execution,
	Control,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level, cli.json_logs)?;

	match cli.command {
		Commands::Validate => validate_config(&cli.config).await,
		Commands::Derive {
			owner,
			para_id,
			scheme,
			network,
			location_version,
		} => {
			let scheme = match scheme {
				Scheme::V2 => DerivationScheme::V2 {
					location_version,
					network,
				},
				Scheme::V3 => DerivationScheme::V3 {
					account_format: owner.format(),
				},
			};
			let derived =
				derive(owner.as_bytes(), para_id, scheme).context("Failed to derive account")?;
			info!(%owner, para_id, %scheme, "Derived account");
			println!("{}", derived);
			Ok(())
		}
		Commands::Fee {
			ref_time,
			proof_size,
			fee_per_second,
			side,
		} => {
			let config = load_config(&cli.config).await?;
			let weights = &config.weights;
			let per_instruction = match side {
				Side::Execution => weights.execution_instruction_weight,
				Side::Control => weights.control_instruction_weight,
			};
			let calculator = WeightFeeCalculator::new(
				per_instruction.into(),
				weights.instruction_count,
				weights.ref_time_per_second,
			);
			let overall = calculator
				.overall_weight(Weight::new(ref_time, proof_size))
				.context("Weight overflow")?;
			let fee = calculator
				.fee_amount(overall, fee_per_second)
				.context("Fee calculation failed")?;
			println!("overall weight: {}", overall);
			println!("fee: {}", fee);
			Ok(())
		}
		Commands::Simulate {
			private_key,
			beneficiary,
			amount,
			base,
			quote,
			trigger,
			threshold,
			fee_per_second,
			hold,
		} => {
			let config = load_config(&cli.config).await?;
			info!("Simulating {} on in-memory chains", config.engine.name);

			let summary = simulation::run(
				config,
				simulation::SimulationOptions {
					private_key,
					beneficiary,
					amount,
					asset_pair: AssetPair::new(base, quote),
					trigger_function: trigger,
					threshold,
					fee_per_second,
				},
			)
			.await?;
			println!("{}", serde_json::to_string_pretty(&summary)?);

			if hold {
				info!("Waiting for shutdown signal");
				setup_shutdown_signal().await;
			}
			Ok(())
		}
	}
}

async fn load_config(path: &Path) -> Result<SchedulerConfig> {
	info!("Loading configuration from: {:?}", path);
	ConfigLoader::new()
		.with_file(path)
		.load()
		.await
		.context("Failed to load configuration")
}

async fn validate_config(path: &Path) -> Result<()> {
	let config = load_config(path).await?;
	let chains = &config.chains;

	info!("Configuration is valid");
	info!("Scheduler name: {}", config.engine.name);
	info!(
		"Execution chain: {} (para {}, {})",
		chains.execution.name, chains.execution.para_id, chains.execution.account_format
	);
	info!(
		"Control chain: {} (para {}, {})",
		chains.control.name, chains.control.para_id, chains.control.account_format
	);
	info!(
		"Derivation: {:?} location, {} network",
		config.derivation.location_version, config.derivation.network
	);
	info!(
		"Task defaults: {} on {}, expiring after {} days",
		config.task.exchange, config.task.price_chain, config.task.expiry_days
	);

	Ok(())
}

fn setup_tracing(log_level: &str, json: bool) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	let registry = tracing_subscriber::registry().with(env_filter);
	if json {
		registry.with(tracing_subscriber::fmt::layer().json()).init();
	} else {
		registry.with(tracing_subscriber::fmt::layer()).init();
	}

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut terminate) => {
				terminate.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}

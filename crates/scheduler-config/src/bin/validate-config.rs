//! Configuration validation utility
//!
//! Usage: cargo run --bin validate-config config/scheduler.toml

use std::env;
use std::process;

use scheduler_config::ConfigLoader;

#[tokio::main]
async fn main() {
	let args: Vec<String> = env::args().collect();

	if args.len() != 2 {
		eprintln!("Usage: {} <config-file>", args[0]);
		process::exit(1);
	}

	let config_path = &args[1];

	println!("Validating configuration file: {}", config_path);

	match ConfigLoader::new().with_file(config_path).load().await {
		Ok(config) => {
			println!("✅ Configuration is valid!");
			println!("Scheduler name: {}", config.engine.name);
			println!(
				"Execution chain: {} (para {})",
				config.chains.execution.name, config.chains.execution.para_id
			);
			println!(
				"Control chain: {} (para {})",
				config.chains.control.name, config.chains.control.para_id
			);
			println!(
				"Derivation: {:?} location, network {}",
				config.derivation.location_version, config.derivation.network
			);
			println!(
				"Instruction count: {}, ref time per second: {}",
				config.weights.instruction_count, config.weights.ref_time_per_second
			);
		}
		Err(e) => {
			eprintln!("❌ Configuration validation failed:");
			eprintln!("{}", e);
			process::exit(1);
		}
	}
}

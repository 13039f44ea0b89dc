//! Main entry point for the forwarder service.
//!
//! The binary serves the forwarding API and offers one-shot commands for
//! inspecting nonces, administering operators and signing requests. All of
//! them build the engine from the same configuration file.

use clap::{Parser, Subcommand};
use forwarder_config::Config;
use forwarder_core::ForwardingEngine;
use forwarder_types::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

mod apis;
mod commands;
mod factory_registry;
mod server;

use factory_registry::build_forwarder_from_config;

/// Command-line arguments for the forwarder service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the forwarding API until interrupted (default)
	Serve,
	/// Print the next nonce an identity must sign
	Nonce { address: String },
	/// Administer or list relaying operators
	Operators {
		#[command(subcommand)]
		action: OperatorsCommand,
	},
	/// Build a request for the key's identity and print it signed
	Sign {
		/// Private key of the authorising identity
		#[arg(long, env = "FORWARDER_SIGNER_KEY", hide_env_values = true)]
		key: String,
		/// Target of the forwarded call
		#[arg(long)]
		to: String,
		/// Native value to attach, decimal or 0x-hex
		#[arg(long, default_value = "0")]
		value: String,
		/// Hex calldata
		#[arg(long, default_value = "0x")]
		data: String,
		/// Nonce to sign; defaults to the identity's current nonce
		#[arg(long)]
		nonce: Option<String>,
		/// Relayer key that co-signs the request as submitter
		#[arg(long, env = "FORWARDER_RELAYER_KEY", hide_env_values = true)]
		relayer_key: Option<String>,
	},
}

#[derive(Subcommand, Debug)]
enum OperatorsCommand {
	/// Admit an operator
	Add {
		address: String,
		/// Private key of the owner
		#[arg(long, env = "FORWARDER_OWNER_KEY", hide_env_values = true)]
		owner_key: String,
	},
	/// Revoke an operator
	Remove {
		address: String,
		/// Private key of the owner
		#[arg(long, env = "FORWARDER_OWNER_KEY", hide_env_values = true)]
		owner_key: String,
	},
	/// List current operators
	List,
}

/// Main entry point for the forwarder service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the forwarding engine with all implementations
/// 5. Runs the requested command
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config_path = args.config.to_string_lossy().into_owned();
	let config = Config::from_file(&config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.forwarder.id);

	let engine = Arc::new(build_forwarder_from_config(config.clone()).await?);

	match args.command.unwrap_or(Command::Serve) {
		Command::Serve => serve(config, engine).await?,
		Command::Nonce { address } => {
			let nonce = commands::nonce(&engine, &address).await?;
			println!("{}", nonce);
		},
		Command::Operators { action } => match action {
			OperatorsCommand::Add { address, owner_key } => {
				let change =
					commands::add_operator(&engine, &address, &SecretString::from(owner_key))
						.await?;
				println!("{}", serde_json::to_string_pretty(&change)?);
			},
			OperatorsCommand::Remove { address, owner_key } => {
				let change =
					commands::remove_operator(&engine, &address, &SecretString::from(owner_key))
						.await?;
				println!("{}", serde_json::to_string_pretty(&change)?);
			},
			OperatorsCommand::List => {
				let operators = commands::list_operators(&engine).await?;
				println!("{}", serde_json::to_string_pretty(&operators)?);
			},
		},
		Command::Sign {
			key,
			to,
			value,
			data,
			nonce,
			relayer_key,
		} => {
			let params = commands::SignParams {
				key: SecretString::from(key),
				to,
				value,
				data,
				nonce,
				relayer_key: relayer_key.map(SecretString::from),
			};
			let signed = commands::sign(&engine, params).await?;
			println!("{}", serde_json::to_string_pretty(&signed)?);
		},
	}

	Ok(())
}

/// Runs the API server until it fails or the process receives ctrl-c.
async fn serve(
	config: Config,
	engine: Arc<ForwardingEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let Some(api_config) = config.api.filter(|api| api.enabled) else {
		return Err("API is disabled; enable [api] to serve".into());
	};

	let mut events = engine.subscribe();
	let audit = tokio::spawn(async move {
		loop {
			match events.recv().await {
				Ok(event) => tracing::debug!(event = ?event, "Forwarder event"),
				Err(RecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Event audit fell behind")
				},
				Err(RecvError::Closed) => break,
			}
		}
	});

	tokio::select! {
		result = server::start_server(api_config, engine) => {
			tracing::info!("API server finished");
			result?;
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Shutting down forwarder");
		}
	}

	audit.abort();
	tracing::info!("Stopped forwarder");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	const CONFIG: &str = r#"
[forwarder]
id = "forwarder-cli-test"
owner = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
operators = ["0x70997970C51812dc3A010C7d01b50e0d17dc79C8"]

[domain]
chain_id = 31337
verifying_contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[storage]
primary = "memory"
[storage.implementations.memory]

[execution]
primary = "memory"
[execution.implementations.memory]
"#;

	#[test]
	fn test_cli_definition_is_consistent() {
		Args::command().debug_assert();
	}

	#[test]
	fn test_args_default_to_serve() {
		let args = Args::try_parse_from(["forwarder"]).unwrap();
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
		assert!(args.command.is_none());
	}

	#[test]
	fn test_parses_operator_administration() {
		let args = Args::try_parse_from([
			"forwarder",
			"--config",
			"custom.toml",
			"operators",
			"add",
			"0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
			"--owner-key",
			"0xabc",
		])
		.unwrap();

		assert_eq!(args.config, PathBuf::from("custom.toml"));
		match args.command {
			Some(Command::Operators {
				action: OperatorsCommand::Add { address, owner_key },
			}) => {
				assert_eq!(address, "0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
				assert_eq!(owner_key, "0xabc");
			},
			other => panic!("unexpected command: {:?}", other),
		}
	}

	#[test]
	fn test_parses_sign_defaults() {
		let args = Args::try_parse_from([
			"forwarder",
			"sign",
			"--key",
			"0xabc",
			"--to",
			"0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
		])
		.unwrap();

		match args.command {
			Some(Command::Sign {
				value, data, nonce, ..
			}) => {
				assert_eq!(value, "0");
				assert_eq!(data, "0x");
				assert!(nonce.is_none());
			},
			other => panic!("unexpected command: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_build_forwarder_with_file_config() {
		let temp_dir = tempfile::tempdir().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		std::fs::write(&config_path, CONFIG).unwrap();

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.forwarder.id, "forwarder-cli-test");

		let engine = build_forwarder_from_config(config).await.unwrap();
		assert_eq!(engine.operators().await.unwrap().len(), 1);
	}

	#[test]
	fn test_demo_config_is_valid() {
		let config: Config = include_str!("../../../config/demo.toml").parse().unwrap();
		assert_eq!(config.storage.primary, "file");
		assert!(config.api.is_some_and(|api| api.enabled));
	}

	#[tokio::test]
	async fn test_serve_requires_enabled_api() {
		let temp_dir = tempfile::tempdir().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		std::fs::write(&config_path, CONFIG).unwrap();

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.unwrap();
		let engine = Arc::new(build_forwarder_from_config(config.clone()).await.unwrap());
		assert!(serve(config, engine).await.is_err());
	}
}

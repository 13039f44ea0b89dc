//! EVM execution through an Alloy JSON-RPC provider.
//!
//! Forwarded calls are sent as transactions from a relayer key. The
//! authorising identity is appended to the calldata as the trailing 20 bytes
//! so that a recipient trusting the relayer can recover it (ERC-2771).

use crate::{ExecutionError, ExecutionInterface};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use async_trait::async_trait;
use forwarder_types::{
	CallResult, ConfigSchema, Field, FieldType, ForwardCall, Schema, SecretString, ValidationError,
};
use std::sync::Arc;

/// Alloy-based EVM execution implementation.
pub struct AlloyExecution {
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	relayer: Address,
}

impl AlloyExecution {
	/// Creates a provider for `rpc_url` that signs with `signer`.
	pub fn new(
		rpc_url: &str,
		signer: PrivateKeySigner,
		chain_id: Option<u64>,
	) -> Result<Self, ExecutionError> {
		let url = rpc_url
			.parse()
			.map_err(|e| ExecutionError::Configuration(format!("Invalid RPC URL: {}", e)))?;

		let relayer = signer.address();
		let wallet = EthereumWallet::from(signer.with_chain_id(chain_id));

		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);

		Ok(Self {
			provider: Arc::new(provider) as Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
			relayer,
		})
	}

	/// Address transactions are sent from.
	pub fn relayer(&self) -> Address {
		self.relayer
	}

	fn transaction(&self, call: &ForwardCall) -> TransactionRequest {
		TransactionRequest::default()
			.from(self.relayer)
			.to(call.to)
			.value(call.value)
			.input(append_sender(&call.data, &call.from).into())
	}
}

/// Appends `from` to `data` as the trailing 20 bytes.
pub fn append_sender(data: &Bytes, from: &Address) -> Bytes {
	let mut input = Vec::with_capacity(data.len() + 20);
	input.extend_from_slice(data);
	input.extend_from_slice(from.as_slice());
	input.into()
}

#[async_trait]
impl ExecutionInterface for AlloyExecution {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(AlloyExecutionSchema)
	}

	async fn execute(&self, call: &ForwardCall) -> Result<CallResult, ExecutionError> {
		let request = self.transaction(call);

		// Pre-flight to capture return data; a revert here is final.
		let return_data = match self.provider.call(&request).await {
			Ok(data) => data,
			Err(e) => {
				if let Some(revert) = e.as_error_resp().and_then(|payload| payload.as_revert_data())
				{
					tracing::info!(to = %call.to, "Forwarded call reverted in pre-flight");
					return Ok(CallResult::failure(revert));
				}
				return Err(ExecutionError::Network(format!("eth_call failed: {}", e)));
			},
		};

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| ExecutionError::Network(format!("Failed to send transaction: {}", e)))?;
		let tx_hash = *pending.tx_hash();
		tracing::info!(tx_hash = %tx_hash, to = %call.to, "Submitted forwarded call");

		let receipt = pending
			.get_receipt()
			.await
			.map_err(|e| ExecutionError::Network(format!("Failed to get receipt: {}", e)))?;

		if receipt.status() {
			Ok(CallResult::success(return_data))
		} else {
			tracing::info!(tx_hash = %tx_hash, "Forwarded call reverted on chain");
			Ok(CallResult::failure(Bytes::new()))
		}
	}
}

/// Configuration schema for AlloyExecution.
pub struct AlloyExecutionSchema;

impl ConfigSchema for AlloyExecutionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
							Ok(())
						},
						_ => Err("rpc_url must be an http(s) URL".to_string()),
					}
				}),
				Field::new("private_key", FieldType::String),
			],
			vec![Field::new(
				"chain_id",
				FieldType::Integer {
					min: Some(1),
					max: None,
				},
			)],
		);
		schema.validate(config)
	}
}

/// Factory function to create an Alloy execution provider from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: JSON-RPC endpoint
/// - `private_key`: relayer key paying for forwarded transactions
/// - `chain_id` (optional): chain id used for EIP-155 signing
pub fn create_execution(
	config: &toml::Value,
) -> Result<Box<dyn ExecutionInterface>, ExecutionError> {
	AlloyExecutionSchema
		.validate(config)
		.map_err(|e| ExecutionError::Configuration(format!("Invalid configuration: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| ExecutionError::Configuration("rpc_url is required".to_string()))?;

	let private_key = SecretString::from(
		config
			.get("private_key")
			.and_then(|v| v.as_str())
			.ok_or_else(|| ExecutionError::Configuration("private_key is required".to_string()))?,
	);
	let signer: PrivateKeySigner = private_key.with_exposed(|key| {
		key.parse()
			.map_err(|_| ExecutionError::Configuration("Invalid private key format".to_string()))
	})?;

	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.map(|id| id as u64);

	Ok(Box::new(AlloyExecution::new(rpc_url, signer, chain_id)?))
}

/// Registry for the Alloy execution implementation.
pub struct Registry;

impl forwarder_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = crate::ExecutionFactory;

	fn factory() -> Self::Factory {
		create_execution
	}
}

impl crate::ExecutionRegistry for Registry {}

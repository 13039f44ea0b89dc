//! One-shot command-line operations against a configured forwarder.
//!
//! Each command builds the engine from the same configuration as `serve`, so
//! with persistent storage it reads and administers the very state the
//! running API uses. File storage locks only for the duration of each write,
//! so these commands work while `serve` is up and the server sees operator
//! changes on its next request.

use crate::factory_registry::load_account;
use forwarder_core::ForwardingEngine;
use forwarder_types::{
	parse_address, parse_hex_bytes, parse_quantity, Address, Bytes, ForwardRequest, SecretString,
	U256,
};
use serde::Serialize;

type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Output of `operators add|remove`.
#[derive(Debug, Serialize)]
pub struct OperatorChange {
	pub operator: Address,
	pub authorized: bool,
}

/// Output of `sign`, ready to post to `/api/forward` once co-signed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequest {
	pub request: ForwardRequest,
	pub signature: Bytes,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub submitter_signature: Option<Bytes>,
}

/// Parameters of the `sign` command as given on the command line.
#[derive(Debug, Clone)]
pub struct SignParams {
	pub key: SecretString,
	pub to: String,
	pub value: String,
	pub data: String,
	pub nonce: Option<String>,
	pub relayer_key: Option<SecretString>,
}

pub async fn nonce(engine: &ForwardingEngine, address: &str) -> CommandResult<U256> {
	let address = parse_address(address)?;
	Ok(engine.get_nonce(&address).await?)
}

pub async fn add_operator(
	engine: &ForwardingEngine,
	address: &str,
	owner_key: &SecretString,
) -> CommandResult<OperatorChange> {
	let operator = parse_address(address)?;
	let owner = load_account(owner_key)?;
	engine.add_operator(&owner.address(), &operator).await?;
	Ok(OperatorChange {
		operator,
		authorized: engine.is_operator(&operator).await?,
	})
}

pub async fn remove_operator(
	engine: &ForwardingEngine,
	address: &str,
	owner_key: &SecretString,
) -> CommandResult<OperatorChange> {
	let operator = parse_address(address)?;
	let owner = load_account(owner_key)?;
	engine.remove_operator(&owner.address(), &operator).await?;
	Ok(OperatorChange {
		operator,
		authorized: engine.is_operator(&operator).await?,
	})
}

pub async fn list_operators(engine: &ForwardingEngine) -> CommandResult<Vec<Address>> {
	Ok(engine.operators().await?)
}

/// Builds a request for the key's identity and signs it under the engine's
/// domain. The nonce defaults to the identity's current one.
///
/// The digest is standard EIP-712: `data` enters the struct hash once, as
/// `keccak256(data)`. Signers that pre-hash `data` before typing it as
/// `bytes` sign `keccak256(keccak256(data))` and are rejected here.
pub async fn sign(engine: &ForwardingEngine, params: SignParams) -> CommandResult<SignedRequest> {
	let signer = load_account(&params.key)?;
	let from = signer.address();

	let nonce = match &params.nonce {
		Some(nonce) => parse_quantity(nonce)?,
		None => engine.get_nonce(&from).await?,
	};

	let request = ForwardRequest {
		from,
		to: parse_address(&params.to)?,
		value: parse_quantity(&params.value)?,
		data: parse_hex_bytes(&params.data)?,
		nonce,
	};

	let signature = signer.sign_request(engine.domain(), &request).await?;
	let submitter_signature = match &params.relayer_key {
		Some(key) => Some(load_account(key)?.sign_request(engine.domain(), &request).await?),
		None => None,
	};

	Ok(SignedRequest {
		request,
		signature,
		submitter_signature,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::factory_registry::build_forwarder_from_config;
	use forwarder_config::builders::config::ConfigBuilder;
	use forwarder_core::{EcdsaVerifier, SignatureVerifier};

	const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const RELAYER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
	const RELAYER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
	const TARGET: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";

	async fn engine() -> ForwardingEngine {
		build_forwarder_from_config(ConfigBuilder::new().build())
			.await
			.unwrap()
	}

	fn params() -> SignParams {
		SignParams {
			key: SecretString::from(OWNER_KEY),
			to: TARGET.to_string(),
			value: "0".to_string(),
			data: "0xdeadbeef".to_string(),
			nonce: None,
			relayer_key: Some(SecretString::from(RELAYER_KEY)),
		}
	}

	#[tokio::test]
	async fn test_owner_administers_operators() {
		let engine = engine().await;
		let owner_key = SecretString::from(OWNER_KEY);

		let change = add_operator(&engine, RELAYER, &owner_key).await.unwrap();
		assert!(change.authorized);
		assert_eq!(
			list_operators(&engine).await.unwrap(),
			vec![parse_address(RELAYER).unwrap()]
		);

		let change = remove_operator(&engine, RELAYER, &owner_key).await.unwrap();
		assert!(!change.authorized);
		assert!(list_operators(&engine).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_non_owner_key_cannot_administer() {
		let engine = engine().await;
		let result = add_operator(&engine, RELAYER, &SecretString::from(RELAYER_KEY)).await;
		assert!(result.is_err());
		assert!(!engine.is_operator(&parse_address(RELAYER).unwrap()).await.unwrap());
	}

	#[tokio::test]
	async fn test_signed_request_is_accepted_by_engine() {
		let engine = engine().await;
		add_operator(&engine, RELAYER, &SecretString::from(OWNER_KEY))
			.await
			.unwrap();

		let signed = sign(&engine, params()).await.unwrap();
		assert_eq!(signed.request.nonce, U256::ZERO);

		let digest = engine.digest(&signed.request);
		let submitter = EcdsaVerifier
			.recover(&digest, signed.submitter_signature.as_ref().unwrap())
			.unwrap();
		assert_eq!(submitter, parse_address(RELAYER).unwrap());

		let outcome = engine
			.forward(&submitter, &signed.request, &signed.signature)
			.await
			.unwrap();
		assert!(outcome.success);
		assert_eq!(nonce(&engine, &signed.request.from.to_string()).await.unwrap(), U256::from(1));

		// The next signature picks up the advanced nonce.
		let next = sign(&engine, params()).await.unwrap();
		assert_eq!(next.request.nonce, U256::from(1));
	}

	#[tokio::test]
	async fn test_sign_with_explicit_nonce_and_no_relayer() {
		let engine = engine().await;
		let mut params = params();
		params.nonce = Some("7".to_string());
		params.relayer_key = None;

		let signed = sign(&engine, params).await.unwrap();
		assert_eq!(signed.request.nonce, U256::from(7));

		let json = serde_json::to_value(&signed).unwrap();
		assert!(json.get("submitterSignature").is_none());
		assert_eq!(json["request"]["data"], "0xdeadbeef");
	}

	#[tokio::test]
	async fn test_sign_rejects_bad_input() {
		let engine = engine().await;
		let mut bad_target = params();
		bad_target.to = "0x1234".to_string();
		assert!(sign(&engine, bad_target).await.is_err());

		let mut bad_data = params();
		bad_data.data = "0xzz".to_string();
		assert!(sign(&engine, bad_data).await.is_err());
	}
}

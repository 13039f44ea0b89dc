//! Read-only views of the engine's registries and domain.

use forwarder_core::ForwardingEngine;
use forwarder_types::{
	parse_address, APIError, Address, DomainResponse, NonceResponse, OperatorStatusResponse,
	OperatorsResponse,
};

fn parse_path_address(value: &str) -> Result<Address, APIError> {
	parse_address(value).map_err(|e| APIError::bad_request("INVALID_ADDRESS", e.to_string()))
}

fn internal(err: impl std::fmt::Display) -> APIError {
	APIError::InternalServerError {
		error_type: "STORAGE_ERROR".to_string(),
		message: err.to_string(),
	}
}

/// Next nonce the given identity must sign.
pub async fn get_nonce(address: &str, engine: &ForwardingEngine) -> Result<NonceResponse, APIError> {
	let address = parse_path_address(address)?;
	let nonce = engine.get_nonce(&address).await.map_err(internal)?;
	Ok(NonceResponse { address, nonce })
}

pub async fn list_operators(engine: &ForwardingEngine) -> Result<OperatorsResponse, APIError> {
	let operators = engine.operators().await.map_err(internal)?;
	Ok(OperatorsResponse {
		owner: engine.owner(),
		operators,
	})
}

pub async fn get_operator_status(
	address: &str,
	engine: &ForwardingEngine,
) -> Result<OperatorStatusResponse, APIError> {
	let address = parse_path_address(address)?;
	let authorized = engine.is_operator(&address).await.map_err(internal)?;
	Ok(OperatorStatusResponse {
		address,
		authorized,
	})
}

pub fn get_domain(engine: &ForwardingEngine) -> DomainResponse {
	DomainResponse {
		domain: engine.domain().clone(),
		domain_separator: engine.domain_separator(),
	}
}

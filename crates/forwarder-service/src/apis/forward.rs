//! Forward endpoint for the forwarder API.
//!
//! A submission carries two signatures over the same EIP-712 digest: the
//! authorising party's, checked by the engine against `request.from`, and
//! the relaying operator's, from which the submitter identity is recovered.

use forwarder_core::{ForwardError, ForwardingEngine, SignatureVerifier};
use forwarder_types::{truncate_id, APIError, ForwardApiRequest, ForwardApiResponse};
use serde_json::json;
use tracing::{info, warn};

/// Recovers the submitter and forwards the request through the engine.
pub async fn process_forward_request(
	body: ForwardApiRequest,
	engine: &ForwardingEngine,
	verifier: &dyn SignatureVerifier,
) -> Result<ForwardApiResponse, APIError> {
	let digest = engine.digest(&body.request);
	let submitter = verifier
		.recover(&digest, &body.submitter_signature)
		.map_err(|e| {
			warn!(from = %body.request.from, error = %e, "Unrecoverable submitter signature");
			APIError::bad_request("INVALID_SUBMITTER_SIGNATURE", e.to_string())
		})?;

	info!(
		submitter = %submitter,
		from = %body.request.from,
		nonce = %body.request.nonce,
		"Forward request received"
	);

	let outcome = engine
		.forward(&submitter, &body.request, &body.signature)
		.await
		.map_err(to_api_error)?;

	info!(
		digest = %truncate_id(&outcome.digest.to_string()),
		success = outcome.success,
		"Forward request completed"
	);
	Ok(ForwardApiResponse { submitter, outcome })
}

/// Maps engine errors onto HTTP errors.
pub fn to_api_error(err: ForwardError) -> APIError {
	let message = err.to_string();
	match err {
		ForwardError::Unauthorized => APIError::Unauthorized {
			error_type: "UNAUTHORIZED".to_string(),
			message,
		},
		ForwardError::InvalidSignature(source) => APIError::BadRequest {
			error_type: "INVALID_SIGNATURE".to_string(),
			message,
			details: Some(json!({ "reason": source.to_string() })),
		},
		ForwardError::NonceMismatch { expected, provided } => APIError::Conflict {
			error_type: "NONCE_MISMATCH".to_string(),
			message,
			details: Some(json!({ "expected": expected, "provided": provided })),
		},
		ForwardError::ExecutionReverted {
			return_data,
			new_nonce,
		} => APIError::UnprocessableEntity {
			error_type: "EXECUTION_REVERTED".to_string(),
			message,
			details: Some(json!({ "returnData": return_data, "newNonce": new_nonce })),
		},
		ForwardError::Storage(_) => APIError::InternalServerError {
			error_type: "STORAGE_ERROR".to_string(),
			message,
		},
	}
}

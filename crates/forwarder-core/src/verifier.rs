//! Signature verification for forward requests.
//!
//! A verifier recovers the identity that produced a signature over an
//! EIP-712 digest. The engine only ever asks whether that identity equals
//! the request's `from`; recovery is behind a trait so tests can swap in
//! a deterministic fake.

use alloy_primitives::{uint, Address, PrimitiveSignature, B256, U256};
use thiserror::Error;

/// Half the secp256k1 group order. Signatures with `s` above it are the
/// malleable twin of a canonical signature and are rejected.
const SECP256K1N_HALF: U256 =
	uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

/// Errors that can occur while checking a signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
	#[error("Invalid signature length: expected 65 bytes, got {0}")]
	InvalidLength(usize),
	#[error("Invalid recovery id: {0}")]
	InvalidRecoveryId(u8),
	#[error("Non-canonical signature: s is in the upper half of the curve order")]
	HighS,
	#[error("Signature recovery failed: {0}")]
	Recovery(String),
	#[error("Signer mismatch: expected {expected}, recovered {recovered}")]
	SignerMismatch { expected: Address, recovered: Address },
}

/// Recovers and checks the signer of a digest.
pub trait SignatureVerifier: Send + Sync {
	/// Recovers the identity that signed `digest`.
	fn recover(&self, digest: &B256, signature: &[u8]) -> Result<Address, SignatureError>;

	/// Succeeds only if `signature` over `digest` was produced by `expected`.
	fn verify(
		&self,
		digest: &B256,
		signature: &[u8],
		expected: &Address,
	) -> Result<(), SignatureError> {
		let recovered = self.recover(digest, signature)?;
		if recovered != *expected {
			return Err(SignatureError::SignerMismatch {
				expected: *expected,
				recovered,
			});
		}
		Ok(())
	}

	fn is_valid(&self, digest: &B256, signature: &[u8], expected: &Address) -> bool {
		self.verify(digest, signature, expected).is_ok()
	}
}

/// secp256k1 ECDSA verifier for 65-byte `r || s || v` signatures.
///
/// `v` may be given as a raw parity (0, 1) or in the legacy 27/28 form.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl EcdsaVerifier {
	pub fn new() -> Self {
		Self
	}
}

impl SignatureVerifier for EcdsaVerifier {
	fn recover(&self, digest: &B256, signature: &[u8]) -> Result<Address, SignatureError> {
		if signature.len() != 65 {
			return Err(SignatureError::InvalidLength(signature.len()));
		}

		let v = signature[64];
		if !matches!(v, 0 | 1 | 27 | 28) {
			return Err(SignatureError::InvalidRecoveryId(v));
		}

		let s = U256::from_be_slice(&signature[32..64]);
		if s > SECP256K1N_HALF {
			return Err(SignatureError::HighS);
		}

		let r = U256::from_be_slice(&signature[..32]);
		let y_parity = matches!(v, 1 | 28);
		PrimitiveSignature::new(r, s, y_parity)
			.recover_address_from_prehash(digest)
			.map_err(|e| SignatureError::Recovery(e.to_string()))
	}
}

/// Verifier whose "signatures" are the signer's 20 address bytes.
///
/// Lets engine tests run without key material or curve arithmetic.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct MockVerifier;

#[cfg(any(test, feature = "testing"))]
impl MockVerifier {
	/// Produces the signature this verifier attributes to `signer`.
	pub fn sign(signer: &Address) -> alloy_primitives::Bytes {
		alloy_primitives::Bytes::copy_from_slice(signer.as_slice())
	}
}

#[cfg(any(test, feature = "testing"))]
impl SignatureVerifier for MockVerifier {
	fn recover(&self, _digest: &B256, signature: &[u8]) -> Result<Address, SignatureError> {
		if signature.len() != 20 {
			return Err(SignatureError::InvalidLength(signature.len()));
		}
		Ok(Address::from_slice(signature))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, b256};
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;

	const SECP256K1N: U256 =
		uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

	fn signer() -> PrivateKeySigner {
		"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
			.parse()
			.unwrap()
	}

	fn digest() -> B256 {
		b256!("1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8")
	}

	fn sign(digest: &B256) -> Vec<u8> {
		signer().sign_hash_sync(digest).unwrap().as_bytes().to_vec()
	}

	#[test]
	fn test_recovers_signer() {
		let signature = sign(&digest());
		let recovered = EcdsaVerifier.recover(&digest(), &signature).unwrap();
		assert_eq!(recovered, address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
		assert!(EcdsaVerifier.is_valid(&digest(), &signature, &recovered));
	}

	#[test]
	fn test_accepts_raw_parity() {
		let mut signature = sign(&digest());
		signature[64] -= 27;
		assert!(EcdsaVerifier
			.verify(&digest(), &signature, &signer().address())
			.is_ok());
	}

	#[test]
	fn test_wrong_signer_is_mismatch() {
		let signature = sign(&digest());
		let other = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
		let err = EcdsaVerifier.verify(&digest(), &signature, &other).unwrap_err();
		assert!(matches!(err, SignatureError::SignerMismatch { expected, .. } if expected == other));
	}

	#[test]
	fn test_other_digest_does_not_verify() {
		let signature = sign(&digest());
		let other = b256!("0000000000000000000000000000000000000000000000000000000000000001");
		assert!(!EcdsaVerifier.is_valid(&other, &signature, &signer().address()));
	}

	#[test]
	fn test_rejects_bad_length() {
		let signature = sign(&digest());
		assert_eq!(
			EcdsaVerifier.recover(&digest(), &signature[..64]),
			Err(SignatureError::InvalidLength(64))
		);
		assert_eq!(
			EcdsaVerifier.recover(&digest(), &[]),
			Err(SignatureError::InvalidLength(0))
		);
	}

	#[test]
	fn test_rejects_unknown_recovery_id() {
		let mut signature = sign(&digest());
		signature[64] = 29;
		assert_eq!(
			EcdsaVerifier.recover(&digest(), &signature),
			Err(SignatureError::InvalidRecoveryId(29))
		);
	}

	#[test]
	fn test_rejects_malleated_high_s() {
		let mut signature = sign(&digest());
		let s = U256::from_be_slice(&signature[32..64]);
		let flipped = SECP256K1N - s;
		signature[32..64].copy_from_slice(&flipped.to_be_bytes::<32>());
		signature[64] = if signature[64] == 27 { 28 } else { 27 };

		assert_eq!(
			EcdsaVerifier.recover(&digest(), &signature),
			Err(SignatureError::HighS)
		);
	}

	#[test]
	fn test_rejects_zero_signature() {
		let mut signature = vec![0u8; 65];
		signature[64] = 27;
		assert!(matches!(
			EcdsaVerifier.recover(&digest(), &signature),
			Err(SignatureError::Recovery(_))
		));
	}

	#[test]
	fn test_mock_verifier_round_trip() {
		let identity = Address::repeat_byte(0x42);
		let signature = MockVerifier::sign(&identity);
		assert!(MockVerifier.verify(&digest(), &signature, &identity).is_ok());
		assert!(!MockVerifier.is_valid(&digest(), &signature, &Address::repeat_byte(1)));
	}
}

//! EIP-712 typed-data hashing for forward requests.
//!
//! These helpers provide:
//! - Domain separator computation
//! - Struct hash computation for `ForwardRequest`
//! - Final digest computation (0x1901 || domainSeparator || structHash)
//! - A minimal ABI encoder for the static words EIP-712 folds together

use crate::{Domain, ForwardRequest};
use alloy_primitives::{keccak256, Address, B256, U256};

/// Type string of the forwarder's EIP-712 domain.
pub const DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
/// Type string of a forward request.
pub const FORWARD_REQUEST_TYPE: &str =
	"ForwardRequest(address from,address to,uint256 value,bytes data,uint256 nonce)";

/// Compute the EIP-712 domain separator.
///
/// keccak256(abi.encode(typeHash, keccak256(name), keccak256(version), chainId, verifyingContract))
pub fn compute_domain_hash(domain: &Domain) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(DOMAIN_TYPE.as_bytes()));
	enc.push_b256(&keccak256(domain.name.as_bytes()));
	enc.push_b256(&keccak256(domain.version.as_bytes()));
	enc.push_u256(U256::from(domain.chain_id));
	enc.push_address(&domain.verifying_contract);
	keccak256(enc.finish())
}

/// Compute the struct hash of a forward request.
///
/// `data` is variable length, so it enters the encoding as keccak256(data).
pub fn compute_request_hash(request: &ForwardRequest) -> B256 {
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&keccak256(FORWARD_REQUEST_TYPE.as_bytes()));
	enc.push_address(&request.from);
	enc.push_address(&request.to);
	enc.push_u256(request.value);
	enc.push_b256(&keccak256(&request.data));
	enc.push_u256(request.nonce);
	keccak256(enc.finish())
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Digest a signer must sign to authorise `request` under `domain`.
pub fn hash_forward_request(domain: &Domain, request: &ForwardRequest) -> B256 {
	compute_final_digest(&compute_domain_hash(domain), &compute_request_hash(request))
}

/// Minimal ABI encoder for static 32-byte words.
#[derive(Default)]
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self {
			buf: Vec::with_capacity(6 * 32),
		}
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	/// Left-pads the 20 address bytes to a full word.
	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; 32];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		let word: [u8; 32] = v.to_be_bytes::<32>();
		self.buf.extend_from_slice(&word);
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}

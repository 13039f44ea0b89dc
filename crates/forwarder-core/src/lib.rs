//! Core forwarding engine.
//!
//! This crate ties together signature verification, replay protection and
//! operator authorization, and runs validated requests through the
//! configured execution substrate. Use [`ForwarderBuilder`] to assemble an
//! engine from configuration and implementation factories.

pub mod builder;
pub mod engine;
pub mod nonce;
pub mod operator;
pub mod verifier;

pub use builder::{BuilderError, ForwarderBuilder, ForwarderFactories};
pub use engine::{event_bus::EventBus, ForwardError, ForwardingEngine};
pub use nonce::{NonceError, NonceRegistry};
pub use operator::{OperatorError, OperatorRegistry};
pub use verifier::{EcdsaVerifier, SignatureError, SignatureVerifier};

#[cfg(any(test, feature = "testing"))]
pub use verifier::MockVerifier;

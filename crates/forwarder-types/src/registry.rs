//! Registry trait for self-registering implementations.
//!
//! Storage and execution backends each expose a `Registry` type naming the
//! key under which they appear in configuration files together with the
//! factory that builds them from that configuration.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// such as "memory" for `storage.implementations.memory` or "evm_alloy"
	/// for `execution.implementations.evm_alloy`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Get the factory function for this implementation.
	fn factory() -> Self::Factory;
}

//! Request handlers for the forwarder API.

pub mod forward;
pub mod registry;

//! Mesh Relay Library
//!
//! This library relays gateway requests to microservice instances:
//! - Instance selection through the load balancer
//! - Capability lookup and RPC invocation
//! - Mapping of outcomes to HTTP responses

pub mod relay;

// Re-export commonly used types
pub use relay::handler::{ErrorType, GatewayHandler};

//! Mesh Core Library
//!
//! This library provides core functionality for the Mesh Gateway system including:
//! - Configuration management
//! - RPC client contract and the JSON-over-HTTP transport
//! - The capability table mapping RPC methods to service bindings

pub mod client;
pub mod config;

// Re-export commonly used types
pub use client::{
    CapabilityError, CapabilityTable, HttpRpcTransport, InstanceAddr, RpcBinding, RpcError,
    RpcTransport, ServiceDefinition,
};
pub use config::model::{
    Config, GlobalSettings, InstanceConfig, RouteConfig, ServiceConfig, WeightConfig,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::model::InstanceConfig;

/// 实例地址，身份由 (host, port) 决定
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceAddr {
    pub host: String,
    pub port: u16,
}

impl InstanceAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for InstanceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<&InstanceConfig> for InstanceAddr {
    fn from(config: &InstanceConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }
}

/// RPC 调用错误
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Transport error calling {addr}: {message}")]
    Transport { addr: String, message: String },

    #[error("Call to {addr} timed out after {timeout_ms}ms")]
    Timeout { addr: String, timeout_ms: u128 },

    #[error("{addr} responded with status {status}: {body}")]
    Status {
        addr: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {addr}: {message}")]
    Decode { addr: String, message: String },
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}

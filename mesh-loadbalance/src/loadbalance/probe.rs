use async_trait::async_trait;
use mesh_core::{RpcError, RpcTransport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::registry::{Instance, Metrics};

/// 健康探测所调用的 RPC 服务与方法
pub const HEALTH_SERVICE: &str = "health.HealthService";
pub const GET_METRICS_METHOD: &str = "GetMetrics";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Probe of {addr} timed out after {timeout_ms}ms")]
    Timeout { addr: String, timeout_ms: u128 },

    #[error("Malformed metrics from {addr}: {message}")]
    Decode { addr: String, message: String },
}

/// 指标探测接口
#[async_trait]
pub trait MetricsProbe: Send + Sync {
    async fn probe(&self, instance: &Instance) -> Result<Metrics, ProbeError>;
}

/// 通过 RPC 调用 `health.HealthService/GetMetrics` 获取指标
pub struct RpcMetricsProbe {
    transport: Arc<dyn RpcTransport>,
    timeout: Duration,
}

impl RpcMetricsProbe {
    pub fn new(transport: Arc<dyn RpcTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[async_trait]
impl MetricsProbe for RpcMetricsProbe {
    async fn probe(&self, instance: &Instance) -> Result<Metrics, ProbeError> {
        let response = self
            .transport
            .invoke(
                instance.addr(),
                HEALTH_SERVICE,
                GET_METRICS_METHOD,
                &json!({}),
                self.timeout,
            )
            .await?;

        serde_json::from_value(response).map_err(|e| ProbeError::Decode {
            addr: instance.id(),
            message: e.to_string(),
        })
    }
}

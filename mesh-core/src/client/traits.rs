use super::types::{InstanceAddr, RpcError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// RPC 传输层接口
///
/// 约定只有一条："在 host:port 上调用 service 的 method，携带 payload，
/// 得到响应或错误"。具体的线上格式由实现决定。
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn invoke(
        &self,
        addr: &InstanceAddr,
        service: &str,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, RpcError>;
}

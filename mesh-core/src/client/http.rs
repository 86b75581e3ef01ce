use super::traits::RpcTransport;
use super::types::{InstanceAddr, RpcError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// 基于 HTTP + JSON 的 RPC 传输
///
/// 请求格式: `POST http://{host}:{port}/{package.Service}/{Method}`，body 为 JSON。
#[derive(Clone)]
pub struct HttpRpcTransport {
    client: Client,
}

impl HttpRpcTransport {
    pub fn new() -> Self {
        Self::with_connect_timeout(Duration::from_secs(5))
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout) // 总超时由每次调用单独指定
            .no_proxy() // 实例都在内网，不走系统代理
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client }
    }

    pub fn rpc_url(addr: &InstanceAddr, service: &str, method: &str) -> String {
        format!("http://{}/{}/{}", addr, service, method)
    }

    fn map_error(addr: &InstanceAddr, timeout: Duration, error: reqwest::Error) -> RpcError {
        if error.is_timeout() {
            RpcError::Timeout {
                addr: addr.to_string(),
                timeout_ms: timeout.as_millis(),
            }
        } else if error.is_decode() {
            RpcError::Decode {
                addr: addr.to_string(),
                message: error.to_string(),
            }
        } else {
            RpcError::Transport {
                addr: addr.to_string(),
                message: error.to_string(),
            }
        }
    }
}

impl Default for HttpRpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn invoke(
        &self,
        addr: &InstanceAddr,
        service: &str,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        let url = Self::rpc_url(addr, service, method);
        tracing::debug!("Invoking {} (timeout: {}ms)", url, timeout.as_millis());

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| Self::map_error(addr, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                addr: addr.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| Self::map_error(addr, timeout, e))?;

        serde_json::from_str(&text).map_err(|e| RpcError::Decode {
            addr: addr.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;

    async fn spawn_backend(router: Router) -> InstanceAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        InstanceAddr::new("127.0.0.1", addr.port())
    }

    #[test]
    fn test_rpc_url_format() {
        let addr = InstanceAddr::new("10.0.0.5", 50051);
        assert_eq!(
            HttpRpcTransport::rpc_url(&addr, "user.UserService", "GetUser"),
            "http://10.0.0.5:50051/user.UserService/GetUser"
        );
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let router = Router::new().route(
            "/user.UserService/GetUser",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "id": body["id"], "name": "Ada" }))
            }),
        );
        let addr = spawn_backend(router).await;

        let transport = HttpRpcTransport::new();
        let result = transport
            .invoke(
                &addr,
                "user.UserService",
                "GetUser",
                &json!({ "id": "42" }),
                Duration::from_secs(2),
            )
            .await
            .unwrap();

        assert_eq!(result["id"], "42");
        assert_eq!(result["name"], "Ada");
    }

    #[tokio::test]
    async fn test_invoke_non_success_status() {
        let router = Router::new(); // 所有路径都返回 404
        let addr = spawn_backend(router).await;

        let transport = HttpRpcTransport::new();
        let err = transport
            .invoke(&addr, "user.UserService", "GetUser", &json!({}), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invoke_malformed_body() {
        let router = Router::new().route(
            "/health.HealthService/GetMetrics",
            post(|| async { "not json" }),
        );
        let addr = spawn_backend(router).await;

        let transport = HttpRpcTransport::new();
        let err = transport
            .invoke(
                &addr,
                "health.HealthService",
                "GetMetrics",
                &json!({}),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let router = Router::new().route(
            "/health.HealthService/GetMetrics",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let addr = spawn_backend(router).await;

        let transport = HttpRpcTransport::new();
        let err = transport
            .invoke(
                &addr,
                "health.HealthService",
                "GetMetrics",
                &json!({}),
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }
}

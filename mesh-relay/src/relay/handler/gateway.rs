use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mesh_core::CapabilityTable;
use mesh_loadbalance::LoadBalancer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::types::{create_error_response, ErrorType};

/// 网关处理器
///
/// 每个请求依次完成：选择实例、查找能力、绑定并调用、把结果映射为 HTTP 响应。
/// 下游调用失败直接返回 5xx，不在这里重试。
pub struct GatewayHandler {
    load_balancer: Arc<dyn LoadBalancer>,
    capabilities: Arc<CapabilityTable>,
    rpc_timeout: Duration,
}

impl GatewayHandler {
    pub fn new(
        load_balancer: Arc<dyn LoadBalancer>,
        capabilities: Arc<CapabilityTable>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            load_balancer,
            capabilities,
            rpc_timeout,
        }
    }

    pub fn load_balancer(&self) -> &Arc<dyn LoadBalancer> {
        &self.load_balancer
    }

    pub fn capabilities(&self) -> &Arc<CapabilityTable> {
        &self.capabilities
    }

    /// 把一次调用转发到 `service` 当前最优的实例
    pub async fn handle(&self, service: &str, method: &str, payload: Value) -> Response {
        let start_time = Instant::now();

        // 1. 选择实例
        let selected = match self.load_balancer.select_best_instance(service) {
            Ok(selected) => selected,
            Err(e) => {
                tracing::warn!("Rejecting {}/{}: {}", service, method, e);
                return create_error_response(
                    ErrorType::ServiceUnavailable,
                    &format!("No instances available for '{service}'"),
                    Some(e.to_string()),
                );
            }
        };

        // 2. 查找能力
        let entry = match self.capabilities.resolve(service, method) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("Capability lookup failed for {}/{}: {}", service, method, e);
                return create_error_response(
                    ErrorType::InternalServerError,
                    &format!("Method '{method}' is not available on service '{service}'"),
                    Some(e.to_string()),
                );
            }
        };

        // 3. 绑定到选中的实例并调用
        let binding = entry.bind(selected.addr().clone(), self.rpc_timeout);
        match binding.call(&payload).await {
            Ok(data) => {
                tracing::debug!(
                    "{}/{} served by {} in {}ms",
                    service,
                    method,
                    binding.addr(),
                    start_time.elapsed().as_millis()
                );
                (
                    StatusCode::OK,
                    Json(json!({
                        "data": data,
                        "served_by": binding.addr().to_string(),
                    })),
                )
                    .into_response()
            }
            Err(e) => {
                tracing::error!(
                    "RPC {}/{} on {} failed: {}",
                    service,
                    method,
                    binding.addr(),
                    e
                );
                create_error_response(
                    ErrorType::InternalServerError,
                    "Internal error in microservice",
                    Some(e.to_string()),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use mesh_core::config::model::{InstanceConfig, ServiceConfig, WeightConfig};
    use mesh_core::{InstanceAddr, RpcError, RpcTransport};
    use mesh_loadbalance::loadbalance::registry::{Instance, ServiceEntry};
    use mesh_loadbalance::{
        HealthSummary, InstanceSelector, Metrics, Registry, RegistrySnapshot, SelectedInstance,
        SelectionError,
    };
    use parking_lot::Mutex;

    /// 直接包装一个选择器，注册表由测试手动设置指标
    struct StaticLoadBalancer {
        selector: InstanceSelector,
    }

    impl LoadBalancer for StaticLoadBalancer {
        fn select_best_instance(
            &self,
            service_name: &str,
        ) -> Result<SelectedInstance, SelectionError> {
            self.selector.select_best_instance(service_name)
        }

        fn registry_snapshot(&self) -> RegistrySnapshot {
            self.selector.registry().snapshot(self.selector.weights())
        }

        fn health_summary(&self) -> HealthSummary {
            HealthSummary::from_registry(self.selector.registry())
        }
    }

    /// 记录调用并返回预设结果的传输层
    struct RecordingTransport {
        calls: Mutex<Vec<(String, String, String, Value)>>,
        fail: bool,
    }

    #[async_trait]
    impl RpcTransport for RecordingTransport {
        async fn invoke(
            &self,
            addr: &InstanceAddr,
            service: &str,
            method: &str,
            payload: &Value,
            _timeout: Duration,
        ) -> Result<Value, RpcError> {
            self.calls.lock().push((
                addr.to_string(),
                service.to_string(),
                method.to_string(),
                payload.clone(),
            ));
            if self.fail {
                Err(RpcError::Status {
                    addr: addr.to_string(),
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(json!({ "id": payload["id"], "name": "alice" }))
            }
        }
    }

    struct Fixture {
        handler: GatewayHandler,
        load_balancer: Arc<StaticLoadBalancer>,
        transport: Arc<RecordingTransport>,
        instances: Vec<Arc<Instance>>,
    }

    fn fixture(fail: bool) -> Fixture {
        let instances = vec![
            Arc::new(Instance::new("127.0.0.1", 50051)),
            Arc::new(Instance::new("127.0.0.1", 50052)),
        ];
        let registry =
            Registry::new(vec![ServiceEntry::new("user", instances.clone())]).unwrap();
        let selector = InstanceSelector::new(Arc::new(registry), WeightConfig::new(0.5, 0.4, 0.1));

        let transport = Arc::new(RecordingTransport {
            calls: Mutex::new(Vec::new()),
            fail,
        });
        let services = vec![ServiceConfig {
            name: "user".to_string(),
            package: "user".to_string(),
            service: "UserService".to_string(),
            methods: vec!["GetUser".to_string()],
            instances: vec![InstanceConfig {
                host: "127.0.0.1".to_string(),
                port: 50051,
            }],
        }];
        let capabilities = CapabilityTable::from_services(&services, transport.clone()).unwrap();
        let load_balancer = Arc::new(StaticLoadBalancer { selector });

        Fixture {
            handler: GatewayHandler::new(
                load_balancer.clone(),
                Arc::new(capabilities),
                Duration::from_secs(1),
            ),
            load_balancer,
            transport,
            instances,
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_routes_to_best_instance() {
        let fixture = fixture(false);
        fixture.instances[0].update_metrics(Metrics::new(0.8, 0.7, 5));
        fixture.instances[1].update_metrics(Metrics::new(0.2, 0.3, 50));

        let response = fixture
            .handler
            .handle("user", "GetUser", json!({ "id": "42" }))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["served_by"], "127.0.0.1:50051");
        assert_eq!(body["data"]["name"], "alice");
        assert_eq!(body["data"]["id"], "42");

        let calls = fixture.transport.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "127.0.0.1:50051");
        assert_eq!(calls[0].1, "user.UserService");
        assert_eq!(calls[0].2, "GetUser");
    }

    #[tokio::test]
    async fn test_no_healthy_instances_is_503() {
        let fixture = fixture(false);

        let response = fixture.handler.handle("user", "GetUser", json!({})).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["error"], "No instances available for 'user'");
        assert!(fixture.transport.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_service_is_503() {
        let fixture = fixture(false);
        let response = fixture.handler.handle("payment", "Pay", json!({})).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_json(response).await["error"],
            "No instances available for 'payment'"
        );
    }

    #[tokio::test]
    async fn test_missing_capability_is_500() {
        let fixture = fixture(false);
        fixture.instances[1].update_metrics(Metrics::new(0.1, 0.1, 1));

        let response = fixture.handler.handle("user", "DeleteUser", json!({})).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(fixture.transport.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rpc_failure_is_500_without_retry() {
        let fixture = fixture(true);
        fixture.instances[0].update_metrics(Metrics::new(0.1, 0.1, 1));
        fixture.instances[1].update_metrics(Metrics::new(0.2, 0.2, 2));

        let response = fixture.handler.handle("user", "GetUser", json!({})).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal error in microservice");
        assert_eq!(fixture.transport.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_health_summary_tracks_demotion() {
        let fixture = fixture(false);
        fixture.instances[0].update_metrics(Metrics::new(0.1, 0.1, 1));
        fixture.instances[1].update_metrics(Metrics::new(0.2, 0.2, 2));

        let summary = fixture.load_balancer.health_summary();
        assert_eq!(summary.healthy_instances, 2);
        assert!(summary.is_system_healthy());

        fixture.instances[0].demote();
        fixture.instances[1].demote();
        let summary = fixture.load_balancer.health_summary();
        assert_eq!(summary.total_instances, 2);
        assert!(!summary.has_available_instances());

        let response = fixture.handler.handle("user", "GetUser", json!({})).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

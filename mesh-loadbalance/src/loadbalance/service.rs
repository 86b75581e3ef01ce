use anyhow::{Context, Result};
use mesh_core::config::model::WeightConfig;
use mesh_core::{Config, HttpRpcTransport};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::poller::{MetricsPoller, PollerHandle, TickReport};
use super::probe::{MetricsProbe, RpcMetricsProbe};
use super::registry::{Registry, RegistrySnapshot};
use super::selector::{InstanceSelector, SelectedInstance, SelectionError};
use super::traits::LoadBalancer;

/// 负载均衡服务
/// 整合注册表、选择器和指标轮询器，提供统一的服务接口
pub struct LoadBalanceService {
    config: Arc<Config>,
    registry: Arc<Registry>,
    selector: InstanceSelector,
    poller: Arc<MetricsPoller>,
    handle: Mutex<Option<PollerHandle>>,
}

impl LoadBalanceService {
    /// 创建新的负载均衡服务，使用 HTTP 传输探测 `GetMetrics`
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpRpcTransport::new());
        let probe = Arc::new(RpcMetricsProbe::new(
            transport,
            config.settings.probe_timeout(),
        ));
        Self::with_probe(config, probe)
    }

    /// 使用自定义探测器创建服务
    pub fn with_probe(config: Config, probe: Arc<dyn MetricsProbe>) -> Result<Self> {
        // 验证配置
        config.validate()?;

        let registry = Arc::new(
            Registry::from_config(&config.services).context("Failed to build service registry")?,
        );
        let selector = InstanceSelector::new(registry.clone(), config.weights);
        let poller = Arc::new(MetricsPoller::from_settings(
            registry.clone(),
            probe,
            &config.settings,
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            selector,
            poller,
            handle: Mutex::new(None),
        })
    }

    /// 启动后台轮询，重复调用不会产生第二个轮询任务
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| h.is_running()) {
            return;
        }

        info!("Starting load balance service");
        *handle = Some(self.poller.clone().start());
        info!("Load balance service started successfully");
    }

    /// 停止后台轮询并等待其退出
    pub async fn stop(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("Load balance service stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| h.is_running())
    }

    /// 手动执行一轮探测
    pub async fn poll_now(&self) -> TickReport {
        self.poller.tick().await
    }

    pub fn select_best_instance(
        &self,
        service_name: &str,
    ) -> Result<SelectedInstance, SelectionError> {
        self.selector.select_best_instance(service_name)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn registry_snapshot(&self) -> RegistrySnapshot {
        self.registry.snapshot(&self.config.weights)
    }

    pub fn get_config(&self) -> Arc<Config> {
        self.config.clone()
    }

    pub fn weights(&self) -> &WeightConfig {
        self.selector.weights()
    }

    /// 获取健康状态摘要
    pub fn health_summary(&self) -> HealthSummary {
        HealthSummary::from_registry(&self.registry)
    }
}

impl LoadBalancer for LoadBalanceService {
    fn select_best_instance(&self, service_name: &str) -> Result<SelectedInstance, SelectionError> {
        LoadBalanceService::select_best_instance(self, service_name)
    }

    fn registry_snapshot(&self) -> RegistrySnapshot {
        LoadBalanceService::registry_snapshot(self)
    }

    fn health_summary(&self) -> HealthSummary {
        LoadBalanceService::health_summary(self)
    }
}

/// 健康检查摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub total_services: usize,
    pub available_services: usize,
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub service_health_ratio: f64,
    pub instance_health_ratio: f64,
}

impl HealthSummary {
    /// 根据注册表当前状态汇总健康情况
    pub fn from_registry(registry: &Registry) -> Self {
        let services = registry.services();
        let total_services = services.len();
        let available_services = services.iter().filter(|s| s.healthy_count() > 0).count();
        let total_instances = registry.instance_count();
        let healthy_instances = registry.healthy_count();

        Self {
            total_services,
            available_services,
            total_instances,
            healthy_instances,
            service_health_ratio: ratio(available_services, total_services),
            instance_health_ratio: ratio(healthy_instances, total_instances),
        }
    }

    /// 每个服务都至少有一个健康实例
    pub fn is_system_healthy(&self) -> bool {
        self.total_services > 0 && self.available_services == self.total_services
    }

    /// 检查是否有任何可用的实例
    pub fn has_available_instances(&self) -> bool {
        self.healthy_instances > 0
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64
    } else {
        0.0
    }
}

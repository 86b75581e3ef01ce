use chrono::{DateTime, Utc};
use mesh_core::config::model::{ServiceConfig, WeightConfig};
use mesh_core::InstanceAddr;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use super::scorer::score;

/// 实例上报的运行时指标
///
/// 线上格式兼容 `memUsage`/`memusage` 与 `connections`/`conns` 两种写法。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cpu: f64,
    #[serde(rename = "memUsage", alias = "memusage", alias = "mem_usage")]
    pub mem_usage: f64,
    #[serde(alias = "conns")]
    pub connections: u64,
}

impl Metrics {
    pub fn new(cpu: f64, mem_usage: f64, connections: u64) -> Self {
        Self {
            cpu,
            mem_usage,
            connections,
        }
    }
}

/// 实例的健康记录，整体替换，读者总是看到完整的旧值或新值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceHealth {
    /// `None` 表示健康状态未知（从未探测成功或最近一次探测失败）
    pub metrics: Option<Metrics>,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// 一个后端副本
#[derive(Debug)]
pub struct Instance {
    addr: InstanceAddr,
    health: RwLock<InstanceHealth>,
}

impl Instance {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            addr: InstanceAddr::new(host, port),
            health: RwLock::new(InstanceHealth::default()),
        }
    }

    pub fn host(&self) -> &str {
        &self.addr.host
    }

    pub fn port(&self) -> u16 {
        self.addr.port
    }

    pub fn addr(&self) -> &InstanceAddr {
        &self.addr
    }

    /// `host:port`
    pub fn id(&self) -> String {
        self.addr.to_string()
    }

    pub fn metrics(&self) -> Option<Metrics> {
        self.health.read().metrics
    }

    pub fn health(&self) -> InstanceHealth {
        self.health.read().clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.health.read().metrics.is_some()
    }

    /// 探测成功：替换指标并清零失败计数
    pub fn update_metrics(&self, metrics: Metrics) {
        *self.health.write() = InstanceHealth {
            metrics: Some(metrics),
            last_checked: Some(Utc::now()),
            consecutive_failures: 0,
        };
    }

    /// 探测失败：降级为未知状态
    pub fn demote(&self) {
        let mut health = self.health.write();
        let consecutive_failures = health.consecutive_failures.saturating_add(1);
        *health = InstanceHealth {
            metrics: None,
            last_checked: Some(Utc::now()),
            consecutive_failures,
        };
    }
}

#[derive(Debug)]
pub struct ServiceEntry {
    pub name: String,
    pub instances: Vec<Arc<Instance>>,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, instances: Vec<Arc<Instance>>) -> Self {
        Self {
            name: name.into(),
            instances,
        }
    }

    pub fn healthy_instances(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.instances.iter().filter(|i| i.is_healthy())
    }

    pub fn healthy_count(&self) -> usize {
        self.healthy_instances().count()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("Service '{service}' lists instance {instance} more than once")]
    DuplicateInstance { service: String, instance: String },
}

/// 服务注册表
///
/// 启动时构建一次，之后服务和实例列表不再变化，只有实例的健康记录会被轮询器更新。
#[derive(Debug)]
pub struct Registry {
    services: Vec<ServiceEntry>,
}

impl Registry {
    pub fn new(services: Vec<ServiceEntry>) -> Result<Self, RegistryError> {
        let mut names = HashSet::new();
        for service in &services {
            if !names.insert(service.name.as_str()) {
                return Err(RegistryError::DuplicateService(service.name.clone()));
            }

            let mut addrs = HashSet::new();
            for instance in &service.instances {
                if !addrs.insert(instance.addr()) {
                    return Err(RegistryError::DuplicateInstance {
                        service: service.name.clone(),
                        instance: instance.id(),
                    });
                }
            }
        }

        Ok(Self { services })
    }

    pub fn from_config(services: &[ServiceConfig]) -> Result<Self, RegistryError> {
        let entries = services
            .iter()
            .map(|service| {
                let instances = service
                    .instances
                    .iter()
                    .map(|i| Arc::new(Instance::new(i.host.clone(), i.port)))
                    .collect();
                ServiceEntry::new(service.name.clone(), instances)
            })
            .collect();

        let registry = Self::new(entries)?;
        tracing::info!(
            "Registry initialized with {} services and {} instances",
            registry.services.len(),
            registry.instance_count()
        );
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn services(&self) -> &[ServiceEntry] {
        &self.services
    }

    /// 按注册顺序遍历所有 (服务, 实例)
    pub fn instances(&self) -> impl Iterator<Item = (&ServiceEntry, &Arc<Instance>)> {
        self.services
            .iter()
            .flat_map(|s| s.instances.iter().map(move |i| (s, i)))
    }

    pub fn instance_count(&self) -> usize {
        self.services.iter().map(|s| s.instances.len()).sum()
    }

    pub fn healthy_count(&self) -> usize {
        self.services.iter().map(|s| s.healthy_count()).sum()
    }

    /// 生成注册表快照，附带按 `weights` 计算的分数
    pub fn snapshot(&self, weights: &WeightConfig) -> RegistrySnapshot {
        let services = self
            .services
            .iter()
            .map(|service| {
                let instances: Vec<InstanceSnapshot> = service
                    .instances
                    .iter()
                    .map(|instance| {
                        let health = instance.health();
                        InstanceSnapshot {
                            host: instance.host().to_string(),
                            port: instance.port(),
                            healthy: health.metrics.is_some(),
                            score: health.metrics.as_ref().map(|m| score(m, weights)),
                            metrics: health.metrics,
                            last_checked: health.last_checked,
                            consecutive_failures: health.consecutive_failures,
                        }
                    })
                    .collect();

                ServiceSnapshot {
                    name: service.name.clone(),
                    total_instances: instances.len(),
                    healthy_instances: instances.iter().filter(|i| i.healthy).count(),
                    instances,
                }
            })
            .collect();

        RegistrySnapshot {
            generated_at: Utc::now(),
            services,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub generated_at: DateTime<Utc>,
    pub services: Vec<ServiceSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub healthy_instances: usize,
    pub total_instances: usize,
    pub instances: Vec<InstanceSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub host: String,
    pub port: u16,
    pub healthy: bool,
    pub metrics: Option<Metrics>,
    pub score: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::config::model::InstanceConfig;

    fn service_config(name: &str, ports: &[u16]) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            package: name.to_string(),
            service: "Svc".to_string(),
            methods: vec![],
            instances: ports
                .iter()
                .map(|p| InstanceConfig {
                    host: "localhost".to_string(),
                    port: *p,
                })
                .collect(),
        }
    }

    #[test]
    fn test_metrics_wire_aliases() {
        let camel: Metrics =
            serde_json::from_str(r#"{"cpu":0.5,"memUsage":0.3,"connections":10}"#).unwrap();
        let legacy: Metrics =
            serde_json::from_str(r#"{"cpu":0.5,"memusage":0.3,"conns":10}"#).unwrap();
        assert_eq!(camel, legacy);
        assert_eq!(camel, Metrics::new(0.5, 0.3, 10));
    }

    #[test]
    fn test_metrics_rejects_malformed() {
        assert!(serde_json::from_str::<Metrics>(r#"{"cpu":0.5}"#).is_err());
        assert!(
            serde_json::from_str::<Metrics>(r#"{"cpu":0.5,"memUsage":0.1,"connections":-1}"#)
                .is_err()
        );
    }

    #[test]
    fn test_instance_starts_unknown() {
        let instance = Instance::new("10.0.0.1", 8000);
        assert_eq!(instance.id(), "10.0.0.1:8000");
        assert!(!instance.is_healthy());
        assert_eq!(instance.health(), InstanceHealth::default());
    }

    #[test]
    fn test_update_and_demote() {
        let instance = Instance::new("10.0.0.1", 8000);

        instance.demote();
        instance.demote();
        assert_eq!(instance.health().consecutive_failures, 2);
        assert!(instance.health().last_checked.is_some());

        instance.update_metrics(Metrics::new(0.1, 0.2, 3));
        let health = instance.health();
        assert_eq!(health.metrics, Some(Metrics::new(0.1, 0.2, 3)));
        assert_eq!(health.consecutive_failures, 0);

        instance.demote();
        assert_eq!(instance.metrics(), None);
        assert_eq!(instance.health().consecutive_failures, 1);
    }

    #[test]
    fn test_all_zero_metrics_are_healthy() {
        let instance = Instance::new("10.0.0.1", 8000);
        instance.update_metrics(Metrics::new(0.0, 0.0, 0));
        assert!(instance.is_healthy());
    }

    #[test]
    fn test_registry_from_config_keeps_order() {
        let registry = Registry::from_config(&[
            service_config("user", &[1, 2, 3]),
            service_config("order", &[4]),
        ])
        .unwrap();

        assert_eq!(registry.services().len(), 2);
        assert_eq!(registry.instance_count(), 4);
        let ports: Vec<u16> = registry
            .get("user")
            .unwrap()
            .instances
            .iter()
            .map(|i| i.port())
            .collect();
        assert_eq!(ports, vec![1, 2, 3]);

        let all: Vec<(String, u16)> = registry
            .instances()
            .map(|(s, i)| (s.name.clone(), i.port()))
            .collect();
        assert_eq!(all.last(), Some(&("order".to_string(), 4)));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err =
            Registry::from_config(&[service_config("user", &[1]), service_config("user", &[2])])
                .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateService("user".to_string()));

        let err = Registry::from_config(&[service_config("user", &[1, 1])]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateInstance { .. }));
    }

    #[test]
    fn test_snapshot_reports_health_and_score() {
        let registry = Registry::from_config(&[service_config("user", &[1, 2])]).unwrap();
        let user = registry.get("user").unwrap();
        user.instances[0].update_metrics(Metrics::new(0.5, 0.3, 10));
        user.instances[1].demote();

        let snapshot = registry.snapshot(&WeightConfig::new(0.5, 0.3, 0.2));
        let service = &snapshot.services[0];
        assert_eq!(service.total_instances, 2);
        assert_eq!(service.healthy_instances, 1);
        assert!(service.instances[0].healthy);
        assert!((service.instances[0].score.unwrap() - 2.34).abs() < 1e-9);
        assert!(!service.instances[1].healthy);
        assert_eq!(service.instances[1].score, None);
        assert_eq!(service.instances[1].consecutive_failures, 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["services"][0]["instances"][0]["metrics"]["memUsage"], 0.3);
    }
}

//! Mesh Load Balance Library
//!
//! 为服务网关提供负载均衡能力：
//! - 服务注册表与实例健康记录
//! - 周期性的指标轮询
//! - 基于加权分数的实例选择

pub mod loadbalance;

// Re-export commonly used types
pub use loadbalance::{
    HealthSummary, Instance, InstanceSelector, LoadBalanceService, LoadBalancer, Metrics,
    MetricsPoller, MetricsProbe, PollerHandle, ProbeError, Registry, RegistrySnapshot,
    RpcMetricsProbe, SelectedInstance, SelectionError, TickReport,
};

use super::registry::RegistrySnapshot;
use super::selector::{SelectedInstance, SelectionError};
use super::service::HealthSummary;

/// 负载均衡器接口
///
/// 网关只依赖这个 trait，便于在测试中替换为固定结果的实现。
/// 所有方法只读取缓存的健康状态，不做网络 I/O。
pub trait LoadBalancer: Send + Sync {
    /// 为指定服务选择分数最低的健康实例
    fn select_best_instance(&self, service_name: &str) -> Result<SelectedInstance, SelectionError>;

    fn registry_snapshot(&self) -> RegistrySnapshot;

    fn health_summary(&self) -> HealthSummary;
}

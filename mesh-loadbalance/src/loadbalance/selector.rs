use mesh_core::config::model::WeightConfig;
use mesh_core::InstanceAddr;
use std::sync::Arc;
use thiserror::Error;

use super::registry::{Instance, Metrics, Registry};
use super::scorer::score;

/// 选择失败的原因，调用方应映射为 503
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Service '{0}' is not registered")]
    UnknownService(String),

    #[error("No healthy instances available for service '{0}'")]
    NoHealthyInstance(String),
}

impl SelectionError {
    pub fn service_name(&self) -> &str {
        match self {
            SelectionError::UnknownService(name) | SelectionError::NoHealthyInstance(name) => name,
        }
    }
}

/// 选择结果：实例以及打分时使用的指标快照
#[derive(Debug, Clone)]
pub struct SelectedInstance {
    pub instance: Arc<Instance>,
    pub metrics: Metrics,
    pub score: f64,
}

impl SelectedInstance {
    pub fn addr(&self) -> &InstanceAddr {
        self.instance.addr()
    }
}

/// 实例选择器
///
/// 只读取注册表中已缓存的指标，不做任何网络 I/O，可与轮询并发调用。
pub struct InstanceSelector {
    registry: Arc<Registry>,
    weights: WeightConfig,
}

impl InstanceSelector {
    pub fn new(registry: Arc<Registry>, weights: WeightConfig) -> Self {
        Self { registry, weights }
    }

    pub fn weights(&self) -> &WeightConfig {
        &self.weights
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// 返回分数最低的健康实例
    ///
    /// 分数相同时保留注册顺序中靠前的实例：只有严格更小的分数才会替换当前最优。
    pub fn select_best_instance(
        &self,
        service_name: &str,
    ) -> Result<SelectedInstance, SelectionError> {
        let service = self
            .registry
            .get(service_name)
            .ok_or_else(|| SelectionError::UnknownService(service_name.to_string()))?;

        let mut best: Option<SelectedInstance> = None;

        for instance in &service.instances {
            // 每个实例只读一次，打分和返回使用同一份指标
            let Some(metrics) = instance.metrics() else {
                continue;
            };

            let candidate_score = score(&metrics, &self.weights);
            let is_better = match &best {
                None => true,
                Some(current) => candidate_score < current.score,
            };

            if is_better {
                best = Some(SelectedInstance {
                    instance: instance.clone(),
                    metrics,
                    score: candidate_score,
                });
            }
        }

        match best {
            Some(selected) => {
                tracing::debug!(
                    "Selected {} for service '{}' (score: {:.4})",
                    selected.instance.id(),
                    service_name,
                    selected.score
                );
                Ok(selected)
            }
            None => {
                tracing::debug!("No healthy instances for service '{}'", service_name);
                Err(SelectionError::NoHealthyInstance(service_name.to_string()))
            }
        }
    }
}

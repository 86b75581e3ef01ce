use mesh_core::config::model::WeightConfig;

use super::registry::Metrics;

/// 计算实例分数，分数越低越优先
///
/// 只接受已存在的指标；指标缺失的实例在调用前就应被过滤掉。
pub fn score(metrics: &Metrics, weights: &WeightConfig) -> f64 {
    metrics.cpu * weights.cpu_weight
        + metrics.mem_usage * weights.mem_weight
        + metrics.connections as f64 * weights.conn_weight
}

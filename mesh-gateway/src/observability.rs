//! Observability module for Mesh Gateway
//!
//! This module provides Prometheus metrics for instance health and RPC traffic.
//! It's only available when the 'observability' feature is enabled.

#[cfg(feature = "observability")]
pub mod prometheus_metrics {
    use crate::app::AppState;
    use ::prometheus::{CounterVec, GaugeVec, Opts, Registry, TextEncoder};
    use axum::{extract::State, http::StatusCode, response::IntoResponse};
    use mesh_loadbalance::RegistrySnapshot;
    use std::sync::Arc;

    const NAMESPACE: &str = "mesh_gateway";

    /// Prometheus metrics collector
    #[derive(Clone)]
    pub struct PrometheusMetrics {
        pub registry: Arc<Registry>,
        pub rpc_requests_total: CounterVec,
        pub instance_healthy: GaugeVec,
        pub instance_score: GaugeVec,
        pub instance_cpu: GaugeVec,
        pub instance_mem_usage: GaugeVec,
        pub instance_connections: GaugeVec,
        pub instance_consecutive_failures: GaugeVec,
    }

    fn instance_gauge(name: &str, help: &str) -> Result<GaugeVec, ::prometheus::Error> {
        GaugeVec::new(
            Opts::new(name, help).namespace(NAMESPACE),
            &["service", "instance"],
        )
    }

    impl PrometheusMetrics {
        pub fn new() -> Result<Self, ::prometheus::Error> {
            let registry = Arc::new(Registry::new());

            let rpc_requests_total = CounterVec::new(
                Opts::new("rpc_requests_total", "Total number of relayed RPC requests")
                    .namespace(NAMESPACE),
                &["service", "status"],
            )?;

            let instance_healthy = instance_gauge(
                "instance_healthy",
                "Health status of instances (1 = healthy, 0 = unhealthy)",
            )?;
            let instance_score =
                instance_gauge("instance_score", "Weighted load score of healthy instances")?;
            let instance_cpu = instance_gauge("instance_cpu", "Last reported CPU usage")?;
            let instance_mem_usage =
                instance_gauge("instance_mem_usage", "Last reported memory usage")?;
            let instance_connections =
                instance_gauge("instance_connections", "Last reported open connections")?;
            let instance_consecutive_failures = instance_gauge(
                "instance_consecutive_failures",
                "Consecutive failed metric probes",
            )?;

            // Register all metrics
            registry.register(Box::new(rpc_requests_total.clone()))?;
            registry.register(Box::new(instance_healthy.clone()))?;
            registry.register(Box::new(instance_score.clone()))?;
            registry.register(Box::new(instance_cpu.clone()))?;
            registry.register(Box::new(instance_mem_usage.clone()))?;
            registry.register(Box::new(instance_connections.clone()))?;
            registry.register(Box::new(instance_consecutive_failures.clone()))?;

            Ok(Self {
                registry,
                rpc_requests_total,
                instance_healthy,
                instance_score,
                instance_cpu,
                instance_mem_usage,
                instance_connections,
                instance_consecutive_failures,
            })
        }

        /// Record a relayed request and its HTTP status
        pub fn record_request(&self, service: &str, status: u16) {
            let status = status.to_string();
            self.rpc_requests_total
                .with_label_values(&[service, status.as_str()])
                .inc();
        }

        /// Update instance gauges from a registry snapshot
        pub fn update_from_snapshot(&self, snapshot: &RegistrySnapshot) {
            for service in &snapshot.services {
                for instance in &service.instances {
                    let id = format!("{}:{}", instance.host, instance.port);
                    let labels = [service.name.as_str(), id.as_str()];

                    self.instance_healthy
                        .with_label_values(&labels)
                        .set(if instance.healthy { 1.0 } else { 0.0 });
                    self.instance_consecutive_failures
                        .with_label_values(&labels)
                        .set(instance.consecutive_failures as f64);

                    // 不健康的实例没有分数，移除旧值避免误导
                    match (&instance.metrics, instance.score) {
                        (Some(metrics), Some(score)) => {
                            self.instance_score.with_label_values(&labels).set(score);
                            self.instance_cpu.with_label_values(&labels).set(metrics.cpu);
                            self.instance_mem_usage
                                .with_label_values(&labels)
                                .set(metrics.mem_usage);
                            self.instance_connections
                                .with_label_values(&labels)
                                .set(metrics.connections as f64);
                        }
                        _ => {
                            let _ = self.instance_score.remove_label_values(&labels);
                            let _ = self.instance_cpu.remove_label_values(&labels);
                            let _ = self.instance_mem_usage.remove_label_values(&labels);
                            let _ = self.instance_connections.remove_label_values(&labels);
                        }
                    }
                }
            }
        }
    }

    /// Prometheus metrics endpoint handler
    pub async fn prometheus_metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
        if let Some(ref metrics) = state.prometheus_metrics {
            // Update metrics from current state
            metrics.update_from_snapshot(&state.load_balancer.registry_snapshot());

            // Encode metrics
            let encoder = TextEncoder::new();
            let metric_families = metrics.registry.gather();

            match encoder.encode_to_string(&metric_families) {
                Ok(output) => (
                    StatusCode::OK,
                    [("content-type", "text/plain; version=0.0.4")],
                    output,
                )
                    .into_response(),
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to encode metrics: {}", e),
                )
                    .into_response(),
            }
        } else {
            (StatusCode::NOT_FOUND, "Prometheus metrics unavailable").into_response()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use mesh_loadbalance::loadbalance::registry::{Instance, ServiceEntry};
        use mesh_loadbalance::{Metrics, Registry};
        use mesh_core::WeightConfig;

        #[test]
        fn test_snapshot_updates_gauges() {
            let healthy = Arc::new(Instance::new("127.0.0.1", 50051));
            healthy.update_metrics(Metrics::new(0.5, 0.3, 10));
            let demoted = Arc::new(Instance::new("127.0.0.1", 50052));
            demoted.demote();

            let registry =
                Registry::new(vec![ServiceEntry::new("user", vec![healthy, demoted])]).unwrap();
            let metrics = PrometheusMetrics::new().unwrap();
            metrics.update_from_snapshot(&registry.snapshot(&WeightConfig::new(0.5, 0.3, 0.2)));
            metrics.record_request("user", 200);

            let output = TextEncoder::new()
                .encode_to_string(&metrics.registry.gather())
                .unwrap();
            assert!(output.contains(
                r#"mesh_gateway_instance_healthy{instance="127.0.0.1:50052",service="user"} 0"#
            ));
            assert!(output.contains(
                r#"mesh_gateway_instance_score{instance="127.0.0.1:50051",service="user"} 2.34"#
            ));
            assert!(!output.contains(r#"mesh_gateway_instance_score{instance="127.0.0.1:50052""#));
            assert!(output.contains(
                r#"mesh_gateway_rpc_requests_total{service="user",status="200"} 1"#
            ));
        }
    }
}

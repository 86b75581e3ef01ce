use futures::future::join_all;
use mesh_core::config::model::GlobalSettings;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::probe::{MetricsProbe, ProbeError};
use super::registry::{Instance, Registry};

/// 一次轮询的结果统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub probed: usize,
    pub healthy: usize,
    pub demoted: usize,
    pub elapsed: Duration,
}

/// 指标轮询器
///
/// 定期探测注册表中的每个实例并更新其指标。同一轮内的探测全部并发，
/// 下一轮要等本轮所有探测结束后才会开始。后台循环和手动触发的 `tick`
/// 共用同一把锁，因此各轮之间不会交叠。
pub struct MetricsPoller {
    registry: Arc<Registry>,
    probe: Arc<dyn MetricsProbe>,
    interval: Duration,
    probe_timeout: Duration,
    tick_lock: Mutex<()>,
}

impl MetricsPoller {
    /// 创建新的轮询器
    pub fn new(
        registry: Arc<Registry>,
        probe: Arc<dyn MetricsProbe>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            probe,
            // tokio 的 interval 不接受零周期
            interval: interval.max(Duration::from_millis(1)),
            probe_timeout,
            tick_lock: Mutex::new(()),
        }
    }

    pub fn from_settings(
        registry: Arc<Registry>,
        probe: Arc<dyn MetricsProbe>,
        settings: &GlobalSettings,
    ) -> Self {
        Self::new(
            registry,
            probe,
            settings.poll_interval(),
            settings.probe_timeout(),
        )
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// 执行一轮探测
    ///
    /// 单个实例的失败只会降级该实例，不会影响其他实例，也不会向外传播。
    pub async fn tick(&self) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        let start_time = Instant::now();
        debug!(
            "Starting metrics poll for {} instances",
            self.registry.instance_count()
        );

        let probes = self
            .registry
            .instances()
            .map(|(service, instance)| self.probe_instance(&service.name, instance));
        let results = join_all(probes).await;

        let probed = results.len();
        let healthy = results.iter().filter(|ok| **ok).count();
        let report = TickReport {
            probed,
            healthy,
            demoted: probed - healthy,
            elapsed: start_time.elapsed(),
        };

        debug!(
            "Completed metrics poll: {}/{} healthy in {}ms",
            report.healthy,
            report.probed,
            report.elapsed.as_millis()
        );
        report
    }

    /// 探测单个实例，返回是否成功
    async fn probe_instance(&self, service_name: &str, instance: &Instance) -> bool {
        let probe = self.probe.probe(instance);
        let result = match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout {
                addr: instance.id(),
                timeout_ms: self.probe_timeout.as_millis(),
            }),
        };

        match result {
            Ok(metrics) => {
                debug!(
                    "{} ({}) -> cpu={} mem={} conns={}",
                    instance.id(),
                    service_name,
                    metrics.cpu,
                    metrics.mem_usage,
                    metrics.connections
                );
                instance.update_metrics(metrics);
                true
            }
            Err(e) => {
                instance.demote();
                warn!(
                    "{} ({}) unreachable, demoted (failures: {}): {}",
                    instance.id(),
                    service_name,
                    instance.health().consecutive_failures,
                    e
                );
                false
            }
        }
    }

    /// 启动轮询循环：立即执行一轮，之后每隔 `interval` 执行一轮，直到被取消
    pub fn start(self: Arc<Self>) -> PollerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let poller = self;

        info!(
            "Starting metrics poller with interval: {:?}, probe timeout: {:?}",
            poller.interval, poller.probe_timeout
        );

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poller.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {}
                }

                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = poller.tick() => {}
                }
            }

            info!("Metrics poller stopped");
        });

        PollerHandle { token, handle }
    }
}

/// 正在运行的轮询循环的句柄
pub struct PollerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// 发出取消信号但不等待
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 取消并等待轮询任务退出，进行中的探测会被丢弃
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!("Metrics poller task failed: {}", e);
        }
    }
}

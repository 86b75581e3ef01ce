use crate::router::router::create_app_router;
use mesh_core::config::loader::{get_config_path, load_config};
use mesh_core::{CapabilityTable, Config, HttpRpcTransport, RpcTransport};
use mesh_loadbalance::{LoadBalanceService, LoadBalancer, MetricsProbe, RpcMetricsProbe};
use mesh_relay::GatewayHandler;

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 应用状态，包含负载均衡服务和网关处理器
#[derive(Clone)]
pub struct AppState {
    pub load_balancer: Arc<LoadBalanceService>,
    pub handler: Arc<GatewayHandler>,
    pub config: Arc<Config>,
    #[cfg(feature = "observability")]
    pub prometheus_metrics: Option<crate::observability::prometheus_metrics::PrometheusMetrics>,
}

impl AppState {
    /// 加载配置、构建并启动所有组件
    pub async fn new() -> Result<Self> {
        // 加载配置
        let config = load_config()?;
        info!("Configuration loaded successfully from: {}", get_config_path());

        let app_state = Self::from_config(config)?;

        // 启动负载均衡服务
        app_state.load_balancer.start().await;
        info!("Load balance service started");

        Ok(app_state)
    }

    /// 使用 HTTP 传输构建应用状态，不启动后台轮询
    pub fn from_config(config: Config) -> Result<Self> {
        let transport: Arc<dyn RpcTransport> = Arc::new(HttpRpcTransport::new());
        let probe = Arc::new(RpcMetricsProbe::new(
            transport.clone(),
            config.settings.probe_timeout(),
        ));
        Self::with_components(config, probe, transport)
    }

    /// 使用指定的探测器和传输层构建应用状态
    pub fn with_components(
        config: Config,
        probe: Arc<dyn MetricsProbe>,
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self> {
        let capabilities = CapabilityTable::from_services(&config.services, transport)
            .context("Failed to build capability table")?;
        let rpc_timeout = config.settings.rpc_timeout();

        // 创建负载均衡服务
        let load_balancer = Arc::new(LoadBalanceService::with_probe(config, probe)?);
        let config = load_balancer.get_config();

        // 创建网关处理器
        let handler = Arc::new(GatewayHandler::new(
            load_balancer.clone() as Arc<dyn LoadBalancer>,
            Arc::new(capabilities),
            rpc_timeout,
        ));

        // 创建Prometheus metrics (如果启用了observability功能)
        #[cfg(feature = "observability")]
        let prometheus_metrics =
            match crate::observability::prometheus_metrics::PrometheusMetrics::new() {
                Ok(metrics) => {
                    info!("Prometheus metrics initialized");
                    Some(metrics)
                }
                Err(e) => {
                    error!("Failed to initialize Prometheus metrics: {}", e);
                    None
                }
            };

        Ok(Self {
            load_balancer,
            handler,
            config,
            #[cfg(feature = "observability")]
            prometheus_metrics,
        })
    }

    /// 停止应用
    pub async fn shutdown(&self) {
        info!("Shutting down application...");
        self.load_balancer.stop().await;
        info!("Application shutdown complete");
    }
}

/// 创建应用路由
pub fn create_app(state: AppState) -> Router {
    create_app_router(&state.config).with_state(state)
}

/// 监听地址：优先使用 BIND_ADDRESS 环境变量
pub fn bind_address(config: &Config) -> String {
    std::env::var("BIND_ADDRESS").unwrap_or_else(|_| config.settings.bind_address.clone())
}

/// 启动应用服务器
pub async fn start_server() -> Result<()> {
    // 初始化日志 - 完全依赖RUST_LOG环境变量
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Mesh Gateway...");
    info!("Configuration file: {}", get_config_path());

    // 创建应用状态
    let app_state = match AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            return Err(e);
        }
    };

    // 创建应用
    let app = create_app(app_state.clone());

    // 启动服务器
    let bind_addr = bind_address(&app_state.config);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    let addr = listener.local_addr()?;

    info!("Gateway listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /              - Gateway information");
    info!("  GET  /health        - Health summary");
    info!("  GET  /registry      - Registry snapshot with scores");
    #[cfg(feature = "observability")]
    info!("  GET  /prometheus    - Prometheus metrics");
    info!("  POST /rpc/{{service}}/{{method}} - Generic RPC pass-through");
    for route in &app_state.config.routes {
        info!(
            "  {:<4} {} -> {}/{}",
            route.http_method.to_ascii_uppercase(),
            route.path,
            route.service,
            route.method
        );
    }

    // 设置优雅关闭
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
        }
        info!("Shutdown signal received");
    };

    // 启动服务器
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

    if let Err(e) = server.await {
        error!("Server error: {}", e);
        app_state.shutdown().await;
        return Err(e.into());
    }

    app_state.shutdown().await;
    Ok(())
}

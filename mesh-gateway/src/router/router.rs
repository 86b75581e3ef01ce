use crate::app::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post, MethodFilter, MethodRouter},
    Router,
};
use bytes::Bytes;
use mesh_core::{Config, RouteConfig};
use std::collections::{BTreeMap, HashMap};
use tower_http::trace::TraceLayer;

use super::{
    health::{health_check, registry_snapshot},
    rpc::{forward, rpc_passthrough},
};
#[cfg(feature = "observability")]
use crate::observability::prometheus_metrics::prometheus_metrics_handler;

/// 创建应用路由
pub fn create_app_router(config: &Config) -> Router<AppState> {
    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/registry", get(registry_snapshot))
        .route("/rpc/{service}/{method}", post(rpc_passthrough));

    #[cfg(feature = "observability")]
    let router = router.route("/prometheus", get(prometheus_metrics_handler));

    configured_routes(router, &config.routes).layer(TraceLayer::new_for_http())
}

/// 把 `[[routes]]` 中的每条映射挂到路由上，同一路径的不同方法合并为一个 MethodRouter
fn configured_routes(router: Router<AppState>, routes: &[RouteConfig]) -> Router<AppState> {
    let mut by_path: BTreeMap<String, MethodRouter<AppState>> = BTreeMap::new();

    for route in routes {
        let Some(filter) = method_filter(&route.http_method) else {
            tracing::warn!(
                "Skipping route {} with unsupported method {}",
                route.path,
                route.http_method
            );
            continue;
        };

        let method_router = by_path
            .remove(&route.path)
            .unwrap_or_else(MethodRouter::new);
        let method_router = if route.path.contains('{') {
            let (service, method) = (route.service.clone(), route.method.clone());
            method_router.on(
                filter,
                move |State(state): State<AppState>,
                      Path(params): Path<HashMap<String, String>>,
                      body: Bytes| async move {
                    forward(state, &service, &method, params, body).await
                },
            )
        } else {
            let (service, method) = (route.service.clone(), route.method.clone());
            method_router.on(
                filter,
                move |State(state): State<AppState>, body: Bytes| async move {
                    forward(state, &service, &method, HashMap::new(), body).await
                },
            )
        };

        by_path.insert(route.path.clone(), method_router);
    }

    by_path
        .into_iter()
        .fold(router, |router, (path, method_router)| {
            router.route(&path, method_router)
        })
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "PATCH" => Some(MethodFilter::PATCH),
        "DELETE" => Some(MethodFilter::DELETE),
        _ => None,
    }
}

/// 首页处理器
pub async fn index() -> &'static str {
    "Mesh Gateway - Metrics-Driven Service Gateway"
}

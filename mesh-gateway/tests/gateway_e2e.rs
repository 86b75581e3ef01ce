//! 使用真实 HTTP 后端的端到端测试：探测、选择、转发

use axum::{extract::Path, routing::post, Json, Router};
use axum_test::TestServer;
use mesh_core::config::loader::parse_config;
use mesh_gateway::{create_app, AppState};
use serde_json::{json, Value};

/// 启动一个模拟微服务实例，返回其端口
async fn spawn_instance(cpu: f64, mem_usage: f64, connections: u64) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let router = Router::new()
        .route(
            "/health.HealthService/GetMetrics",
            post(move || async move {
                Json(json!({ "cpu": cpu, "memUsage": mem_usage, "connections": connections }))
            }),
        )
        .route(
            "/user.UserService/{method}",
            post(move |Path(method): Path<String>, Json(body): Json<Value>| async move {
                Json(json!({ "method": method, "id": body["id"], "port": port }))
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    port
}

/// 获取一个当前没有监听者的端口
async fn dead_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn config(ports: &[u16]) -> String {
    let instances = ports
        .iter()
        .map(|port| format!(r#"{{ host = "127.0.0.1", port = {port} }}"#))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
[settings]
probe_timeout_ms = 500
rpc_timeout_ms = 1000

[weights]
cpu_weight = 0.5
mem_weight = 0.4
conn_weight = 0.1

[[services]]
name = "user"
package = "user"
service = "UserService"
methods = ["GetUser"]
instances = [{instances}]

[[routes]]
http_method = "GET"
path = "/users/{{id}}"
service = "user"
method = "GetUser"
"#
    )
}

#[tokio::test]
async fn test_request_served_by_least_loaded_instance() {
    let busy = spawn_instance(0.8, 0.7, 50).await;
    let idle = spawn_instance(0.1, 0.2, 3).await;
    let dead = dead_port().await;

    let state = AppState::from_config(parse_config(&config(&[dead, busy, idle])).unwrap()).unwrap();
    let report = state.load_balancer.poll_now().await;
    assert_eq!(report.probed, 3);
    assert_eq!(report.healthy, 2);
    assert_eq!(report.demoted, 1);

    let server = TestServer::new(create_app(state)).unwrap();
    let response = server.get("/users/42").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["served_by"], format!("127.0.0.1:{idle}"));
    assert_eq!(body["data"]["method"], "GetUser");
    assert_eq!(body["data"]["id"], "42");
    assert_eq!(body["data"]["port"], idle);
}

#[tokio::test]
async fn test_all_instances_down_is_503() {
    let config = parse_config(&config(&[dead_port().await])).unwrap();
    let state = AppState::from_config(config).unwrap();
    state.load_balancer.poll_now().await;

    let server = TestServer::new(create_app(state)).unwrap();
    let response = server.get("/users/1").await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response.json::<Value>()["error"],
        "No instances available for 'user'"
    );
}

#[tokio::test]
async fn test_background_poller_discovers_instances() {
    let port = spawn_instance(0.3, 0.3, 3).await;
    let mut config = parse_config(&config(&[port])).unwrap();
    config.settings.poll_interval_ms = 50;

    let state = AppState::from_config(config).unwrap();
    assert!(state.load_balancer.select_best_instance("user").is_err());

    state.load_balancer.start().await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert_eq!(
        state.load_balancer.select_best_instance("user").unwrap().addr().port,
        port
    );

    state.shutdown().await;
    assert!(!state.load_balancer.is_running().await);
}

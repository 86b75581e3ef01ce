use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// 权重之和允许偏离 1.0 的范围
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub weights: WeightConfig,
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlobalSettings {
    /// 指标轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// 单次探测超时（毫秒），超时等同于探测失败
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// 转发到微服务的RPC调用超时（毫秒）
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            probe_timeout_ms: default_probe_timeout(),
            rpc_timeout_ms: default_rpc_timeout(),
            bind_address: default_bind_address(),
        }
    }
}

impl GlobalSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

/// 评分权重配置
///
/// 三个权重都必须是非负的有限数。权重之和不为 1.0 时只告警，不影响评分。
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct WeightConfig {
    #[serde(default = "default_cpu_weight")]
    pub cpu_weight: f64,
    #[serde(default = "default_mem_weight")]
    pub mem_weight: f64,
    #[serde(default = "default_conn_weight")]
    pub conn_weight: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            cpu_weight: default_cpu_weight(),
            mem_weight: default_mem_weight(),
            conn_weight: default_conn_weight(),
        }
    }
}

impl WeightConfig {
    pub fn new(cpu_weight: f64, mem_weight: f64, conn_weight: f64) -> Self {
        Self {
            cpu_weight,
            mem_weight,
            conn_weight,
        }
    }

    pub fn sum(&self) -> f64 {
        self.cpu_weight + self.mem_weight + self.conn_weight
    }

    /// 权重之和是否在 1.0 ± 0.01 之内
    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }

    /// 验证权重；负数或非有限值是错误，权重之和偏离 1.0 只记录警告
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("cpu_weight", self.cpu_weight),
            ("mem_weight", self.mem_weight),
            ("conn_weight", self.conn_weight),
        ] {
            if !value.is_finite() {
                anyhow::bail!("Weight '{}' must be a finite number, got {}", name, value);
            }
            if value < 0.0 {
                anyhow::bail!("Weight '{}' must be non-negative, got {}", name, value);
            }
        }

        if !self.is_normalized() {
            tracing::warn!(
                "Weights do not sum to 1.0 (cpu={}, mem={}, conn={}, sum={:.4}); scoring will use them as-is",
                self.cpu_weight,
                self.mem_weight,
                self.conn_weight,
                self.sum()
            );
        }

        Ok(())
    }
}

/// 微服务定义：schema 元数据 + 副本实例列表
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// 对外使用的服务名，例如 "user"
    pub name: String,
    /// RPC 包名，例如 "user"
    pub package: String,
    /// RPC 服务名，例如 "UserService"
    pub service: String,
    /// 该服务暴露的方法名
    #[serde(default)]
    pub methods: Vec<String>,
    pub instances: Vec<InstanceConfig>,
}

impl ServiceConfig {
    /// RPC 路径中使用的全限定服务名，例如 "user.UserService"
    pub fn qualified_service(&self) -> String {
        format!("{}.{}", self.package, self.service)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Hash)]
pub struct InstanceConfig {
    pub host: String,
    pub port: u16,
}

/// HTTP 路由到 RPC 方法的映射
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouteConfig {
    #[serde(default = "default_http_method")]
    pub http_method: String,
    /// axum 风格的路径，例如 "/users/{id}"
    pub path: String,
    pub service: String,
    pub method: String,
}

impl RouteConfig {
    /// 路径的形状：每个 `{name}` 段替换为 `{}`
    ///
    /// 形状相同的两条路径在路由表中会匹配同一批请求。路径中出现 `:`/`*` 开头的段、
    /// 不成对的花括号、参数名非法或重复时返回错误。
    pub fn path_shape(&self) -> Result<String> {
        let mut params = HashSet::new();
        let mut shape = Vec::new();

        for segment in self.path.split('/') {
            if segment.starts_with(':') || segment.starts_with('*') {
                anyhow::bail!(
                    "Route '{}' has segment '{}'; use '{{name}}' for path parameters",
                    self.path,
                    segment
                );
            }

            if !segment.contains(['{', '}']) {
                shape.push(segment);
                continue;
            }

            let name = segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .filter(|name| {
                    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                })
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Route '{}' has malformed path parameter '{}'",
                        self.path,
                        segment
                    )
                })?;

            if !params.insert(name) {
                anyhow::bail!(
                    "Route '{}' declares path parameter '{}' more than once",
                    self.path,
                    name
                );
            }
            shape.push("{}");
        }

        Ok(shape.join("/"))
    }
}

// Default value functions
fn default_poll_interval() -> u64 {
    3000
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_rpc_timeout() -> u64 {
    5000
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_cpu_weight() -> f64 {
    0.5
}

fn default_mem_weight() -> f64 {
    0.3
}

fn default_conn_weight() -> f64 {
    0.2
}

fn default_http_method() -> String {
    "GET".to_string()
}

const SUPPORTED_HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// 网关自身占用的路径，配置的路由不能覆盖
pub const RESERVED_PATHS: &[&str] = &["/", "/health", "/registry", "/prometheus"];
pub const RPC_PATH_PREFIX: &str = "/rpc/";

impl Config {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.settings.poll_interval_ms == 0 {
            anyhow::bail!("Invalid poll_interval_ms: cannot be 0");
        }

        if self.settings.probe_timeout_ms == 0 {
            anyhow::bail!("Invalid probe_timeout_ms: cannot be 0");
        }

        if self.settings.rpc_timeout_ms == 0 {
            anyhow::bail!("Invalid rpc_timeout_ms: cannot be 0");
        }

        self.weights.validate()?;

        if self.services.is_empty() {
            anyhow::bail!("No services defined");
        }

        let mut names = HashSet::new();
        let mut methods = HashSet::new();
        for service in &self.services {
            self.validate_service_config(service)?;

            if !names.insert(service.name.as_str()) {
                anyhow::bail!("Duplicate service name '{}'", service.name);
            }

            for method in &service.methods {
                if !methods.insert(method.as_str()) {
                    anyhow::bail!(
                        "Method '{}' is declared by more than one service (last: '{}')",
                        method,
                        service.name
                    );
                }
            }
        }

        let mut routes = HashSet::new();
        let mut shapes: HashMap<String, &str> = HashMap::new();
        for route in &self.routes {
            self.validate_route_config(route)?;

            let shape = route.path_shape()?;
            if let Some(existing) = shapes.get(&shape) {
                if *existing != route.path {
                    anyhow::bail!(
                        "Route '{}' overlaps route '{}'; path parameters must use the same names",
                        route.path,
                        existing
                    );
                }
            }
            shapes.insert(shape, route.path.as_str());

            if !routes.insert((route.http_method.to_ascii_uppercase(), route.path.as_str())) {
                anyhow::bail!(
                    "Duplicate route {} {}",
                    route.http_method.to_ascii_uppercase(),
                    route.path
                );
            }
        }

        Ok(())
    }

    /// 验证单个服务配置的有效性
    fn validate_service_config(&self, service: &ServiceConfig) -> Result<()> {
        if service.name.is_empty() {
            anyhow::bail!("Service has empty name");
        }

        if service.name.contains(char::is_whitespace) {
            anyhow::bail!(
                "Service '{}' has invalid name format (cannot contain whitespace)",
                service.name
            );
        }

        if service.package.is_empty() {
            anyhow::bail!("Service '{}' has empty package", service.name);
        }

        if service.service.is_empty() {
            anyhow::bail!("Service '{}' has empty service", service.name);
        }

        if service.instances.is_empty() {
            anyhow::bail!("Service '{}' has no instances defined", service.name);
        }

        for method in &service.methods {
            if method.is_empty() {
                anyhow::bail!("Service '{}' has empty method name", service.name);
            }
        }

        let mut seen = HashSet::new();
        for instance in &service.instances {
            if instance.host.is_empty() {
                anyhow::bail!("Service '{}' has instance with empty host", service.name);
            }
            if instance.port == 0 {
                anyhow::bail!(
                    "Service '{}' has instance '{}' with invalid port 0",
                    service.name,
                    instance.host
                );
            }
            if !seen.insert(instance) {
                anyhow::bail!(
                    "Service '{}' has duplicate instance {}:{}",
                    service.name,
                    instance.host,
                    instance.port
                );
            }
        }

        Ok(())
    }

    /// 验证单个路由配置的有效性
    fn validate_route_config(&self, route: &RouteConfig) -> Result<()> {
        if !route.path.starts_with('/') {
            anyhow::bail!("Route '{}' must start with '/'", route.path);
        }

        if RESERVED_PATHS.contains(&route.path.as_str()) || route.path.starts_with(RPC_PATH_PREFIX)
        {
            anyhow::bail!("Route '{}' conflicts with a built-in gateway path", route.path);
        }

        let method = route.http_method.to_ascii_uppercase();
        if !SUPPORTED_HTTP_METHODS.contains(&method.as_str()) {
            anyhow::bail!(
                "Route '{}' has unsupported http_method '{}'",
                route.path,
                route.http_method
            );
        }

        let service = self.get_service(&route.service).ok_or_else(|| {
            anyhow::anyhow!(
                "Route '{}' references unknown service '{}'",
                route.path,
                route.service
            )
        })?;

        if !service.methods.contains(&route.method) {
            anyhow::bail!(
                "Route '{}' references method '{}' not declared by service '{}'",
                route.path,
                route.method,
                route.service
            );
        }

        Ok(())
    }

    /// 获取指定服务的配置
    pub fn get_service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// 获取所有服务名称（保持配置顺序）
    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// 实例总数
    pub fn total_instances(&self) -> usize {
        self.services.iter().map(|s| s.instances.len()).sum()
    }
}

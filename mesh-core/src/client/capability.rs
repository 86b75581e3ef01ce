use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::traits::RpcTransport;
use super::types::{InstanceAddr, RpcError};
use crate::config::model::ServiceConfig;

/// 服务的 schema 元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// 对外服务名，例如 "user"
    pub name: String,
    /// 全限定 RPC 服务名，例如 "user.UserService"
    pub qualified_service: String,
    pub methods: Vec<String>,
}

impl From<&ServiceConfig> for ServiceDefinition {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            name: config.name.clone(),
            qualified_service: config.qualified_service(),
            methods: config.methods.clone(),
        }
    }
}

/// 绑定构建器函数类型
///
/// 接受实例地址和调用超时，返回绑定到该实例上某个方法的 [`RpcBinding`]
pub type BindingFactory = Box<dyn Fn(InstanceAddr, Duration) -> RpcBinding + Send + Sync>;

/// 已绑定到具体实例和方法的可调用对象
#[derive(Clone)]
pub struct RpcBinding {
    transport: Arc<dyn RpcTransport>,
    addr: InstanceAddr,
    service: String,
    method: String,
    timeout: Duration,
}

impl RpcBinding {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        addr: InstanceAddr,
        service: String,
        method: String,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            addr,
            service,
            method,
            timeout,
        }
    }

    pub fn addr(&self) -> &InstanceAddr {
        &self.addr
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn call(&self, payload: &Value) -> Result<Value, RpcError> {
        self.transport
            .invoke(&self.addr, &self.service, &self.method, payload, self.timeout)
            .await
    }
}

/// 能力表条目：服务定义 + 绑定工厂
pub struct CapabilityEntry {
    pub definition: Arc<ServiceDefinition>,
    factory: BindingFactory,
}

impl CapabilityEntry {
    pub fn bind(&self, addr: InstanceAddr, timeout: Duration) -> RpcBinding {
        (self.factory)(addr, timeout)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Method '{method}' is not provided by any service")]
    UnknownMethod { method: String },

    #[error("Method '{method}' belongs to service '{actual}', not '{expected}'")]
    ServiceMismatch {
        method: String,
        expected: String,
        actual: String,
    },

    #[error("Method '{method}' is already registered by service '{existing}'")]
    DuplicateMethod { method: String, existing: String },
}

/// 能力表
///
/// 启动时从服务 schema 元数据一次性构建的 `方法名 -> (服务定义, 绑定工厂)` 映射，
/// 请求路径上只做查表。
#[derive(Default)]
pub struct CapabilityTable {
    entries: HashMap<String, CapabilityEntry>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为每个服务声明的每个方法注册一个通过 `transport` 调用的绑定工厂
    pub fn from_services(
        services: &[ServiceConfig],
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self, CapabilityError> {
        let mut table = Self::new();

        for service in services {
            let definition = Arc::new(ServiceDefinition::from(service));

            for method in &service.methods {
                let transport = transport.clone();
                let qualified = definition.qualified_service.clone();
                let method_name = method.clone();

                table.register(
                    method,
                    definition.clone(),
                    Box::new(move |addr, timeout| {
                        RpcBinding::new(
                            transport.clone(),
                            addr,
                            qualified.clone(),
                            method_name.clone(),
                            timeout,
                        )
                    }),
                )?;
            }
        }

        tracing::info!(
            "Built capability table with {} methods across {} services",
            table.len(),
            services.len()
        );
        Ok(table)
    }

    /// 注册一个方法
    pub fn register(
        &mut self,
        method: &str,
        definition: Arc<ServiceDefinition>,
        factory: BindingFactory,
    ) -> Result<(), CapabilityError> {
        if let Some(existing) = self.entries.get(method) {
            return Err(CapabilityError::DuplicateMethod {
                method: method.to_string(),
                existing: existing.definition.name.clone(),
            });
        }

        tracing::debug!(
            "Registered capability {} -> {}",
            method,
            definition.qualified_service
        );
        self.entries
            .insert(method.to_string(), CapabilityEntry { definition, factory });
        Ok(())
    }

    /// 查找 `service_name` 上的 `method`
    pub fn resolve(
        &self,
        service_name: &str,
        method: &str,
    ) -> Result<&CapabilityEntry, CapabilityError> {
        let entry = self
            .entries
            .get(method)
            .ok_or_else(|| CapabilityError::UnknownMethod {
                method: method.to_string(),
            })?;

        if entry.definition.name != service_name {
            return Err(CapabilityError::ServiceMismatch {
                method: method.to_string(),
                expected: service_name.to_string(),
                actual: entry.definition.name.clone(),
            });
        }

        Ok(entry)
    }

    pub fn contains(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

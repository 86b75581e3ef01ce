pub mod capability;
pub mod http;
pub mod traits;
pub mod types;

pub use capability::{
    BindingFactory, CapabilityEntry, CapabilityError, CapabilityTable, RpcBinding,
    ServiceDefinition,
};
pub use http::HttpRpcTransport;
pub use traits::RpcTransport;
pub use types::{InstanceAddr, RpcError};

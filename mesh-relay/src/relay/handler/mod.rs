pub mod gateway;
pub mod types;

pub use gateway::GatewayHandler;
pub use types::*;

//! Mesh Gateway Server
//!
//! Main entry point for the metrics-driven service gateway

use mesh_gateway::start_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    start_server().await
}

//! Mesh CLI Tool
//!
//! Command line interface for inspecting a Mesh Gateway deployment

use anyhow::Result;
use clap::{Parser, Subcommand};
use mesh_core::config::loader::load_config_from_path;
use mesh_loadbalance::{LoadBalanceService, RegistrySnapshot, SelectionError};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mesh-cli")]
#[command(about = "A CLI tool for inspecting Mesh Gateway services")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    ValidateConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config_example.toml")]
        output: String,
    },
    /// Probe every instance once and print the registry
    Probe {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the poller for a while, then print the best instance of a service
    Select {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.toml")]
        config: String,
        /// Service name
        #[arg(short, long)]
        service: String,
        /// How long to poll before selecting
        #[arg(long, default_value_t = 5000)]
        wait_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ValidateConfig { config } => {
            println!("Validating configuration file: {}", config);
            match load_config_from_path(&config) {
                Ok(cfg) => {
                    println!("✅ Configuration is valid");
                    println!("  - {} services configured", cfg.services.len());
                    println!("  - {} instances configured", cfg.total_instances());
                    println!("  - {} routes configured", cfg.routes.len());
                    println!(
                        "  - weights: cpu={} mem={} conns={}",
                        cfg.weights.cpu_weight, cfg.weights.mem_weight, cfg.weights.conn_weight
                    );
                }
                Err(e) => {
                    eprintln!("❌ Configuration validation failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::GenerateConfig { output } => {
            println!("Generating configuration file: {}", output);
            std::fs::write(&output, EXAMPLE_CONFIG)?;
            println!("✅ Configuration file generated successfully");
        }
        Commands::Probe { config, json } => {
            let cfg = load_config_from_path(&config)?;
            let load_balancer = LoadBalanceService::new(cfg)?;

            let report = load_balancer.poll_now().await;
            let snapshot = load_balancer.registry_snapshot();

            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!(
                    "Probed {} instances in {}ms: {} healthy, {} unreachable",
                    report.probed,
                    report.elapsed.as_millis(),
                    report.healthy,
                    report.demoted
                );
                println!();
                print_snapshot(&snapshot);
            }
        }
        Commands::Select {
            config,
            service,
            wait_ms,
        } => {
            let cfg = load_config_from_path(&config)?;
            let load_balancer = LoadBalanceService::new(cfg)?;

            load_balancer.start().await;
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            let selection = load_balancer.select_best_instance(&service);
            load_balancer.stop().await;

            match selection {
                Ok(selected) => println!(
                    "🎯 Best instance for '{}': {} (score: {:.4})",
                    service,
                    selected.addr(),
                    selected.score
                ),
                Err(SelectionError::NoHealthyInstance(_)) => {
                    println!("❌ No healthy instances for '{}'", service);
                    std::process::exit(1);
                }
                Err(e @ SelectionError::UnknownService(_)) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// 打印注册表快照
fn print_snapshot(snapshot: &RegistrySnapshot) {
    for service in &snapshot.services {
        println!(
            "📦 {} ({}/{} healthy)",
            service.name, service.healthy_instances, service.total_instances
        );
        for instance in &service.instances {
            match (&instance.metrics, instance.score) {
                (Some(metrics), Some(score)) => println!(
                    "  🟢 {}:{}  cpu={} mem={} conns={}  score={:.4}",
                    instance.host,
                    instance.port,
                    metrics.cpu,
                    metrics.mem_usage,
                    metrics.connections,
                    score
                ),
                _ => println!(
                    "  🔴 {}:{}  unreachable ({} consecutive failures)",
                    instance.host, instance.port, instance.consecutive_failures
                ),
            }
        }
    }
}

const EXAMPLE_CONFIG: &str = r#"# Mesh Gateway Configuration File

[settings]
# 指标轮询间隔与单次探测超时（毫秒）
poll_interval_ms = 3000
probe_timeout_ms = 1000
# 转发调用超时（毫秒）
rpc_timeout_ms = 5000
bind_address = "127.0.0.1:8080"

# score = cpu * cpu_weight + memUsage * mem_weight + connections * conn_weight
# 分数越低越优先
[weights]
cpu_weight = 0.5
mem_weight = 0.3
conn_weight = 0.2

[[services]]
name = "user"
package = "user"
service = "UserService"
methods = ["GetUser"]
instances = [
    { host = "localhost", port = 50051 },
    { host = "localhost", port = 50052 },
]

[[routes]]
http_method = "GET"
path = "/users/{id}"
service = "user"
method = "GetUser"
"#;

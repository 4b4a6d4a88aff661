//! `meshctl` — thin operator CLI for the mesh bonding engine.
//!
//! No daemon/IPC layer: every subcommand bootstraps (or talks directly to)
//! the engine in-process. `start` is the long-running case; the rest are
//! one-shot reads or explicit actions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mesh_engine::net::linux::LinuxPlatformPort;
use mesh_engine::net::PlatformPort;
use mesh_engine::{MeshConfig, MeshManager};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "meshctl", about = "Multi-path connection bonding engine control")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a JSON or TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the engine and run until interrupted.
    Start,
    /// Print a one-shot status snapshot.
    Status,
    /// Print a one-shot performance report.
    Stats {
        /// Write the report to a JSON file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Stream engine logs at the given level.
    Logs {
        #[arg(long)]
        follow: bool,
        #[arg(long, default_value = "info")]
        level: String,
    },
    /// Run the probe suite against one interface.
    Test {
        interface: String,
        #[arg(long, default_value_t = 5)]
        duration: u64,
    },
    /// Force a manual failover between two interfaces.
    Failover { from: String, to: String },
    /// Print or write the JSON configuration skeleton.
    Config {
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Start => cmd_start(config).await,
        Command::Status => cmd_status(config).await,
        Command::Stats { output } => cmd_stats(config, output).await,
        Command::Logs { follow, level } => cmd_logs(config, follow, &level).await,
        Command::Test { interface, duration } => cmd_test(&interface, duration).await,
        Command::Failover { from, to } => cmd_failover(config, &from, &to).await,
        Command::Config { output } => cmd_config(output),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<MeshConfig> {
    let Some(path) = path else {
        return Ok(MeshConfig::default());
    };
    let raw = std::fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => MeshConfig::from_toml(&raw)?,
        _ => MeshConfig::from_json(&raw)?,
    };
    Ok(config)
}

async fn cmd_start(config: MeshConfig) -> anyhow::Result<()> {
    let platform: Arc<dyn PlatformPort> = Arc::new(LinuxPlatformPort::new());
    let manager = MeshManager::bootstrap(platform, config).await?;
    let handles = manager.spawn();

    tracing::info!("meshctl started, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    manager.shutdown();
    for handle in handles {
        let _ = handle.await;
    }
    tracing::info!("meshctl stopped");
    Ok(())
}

async fn cmd_status(config: MeshConfig) -> anyhow::Result<()> {
    let platform: Arc<dyn PlatformPort> = Arc::new(LinuxPlatformPort::new());
    let manager = MeshManager::bootstrap(platform, config).await?;
    let status = manager.status().await;

    println!("Mesh Status");
    println!("══════════════════════════════");
    println!("  Node ID:        {}", status.node_id);
    println!("  Address:        {}", status.address);
    println!("  Running:        {}", status.running);
    println!("  Failover state: {:?}", status.failover_state);
    println!("  Aggregation:    {:?}", status.aggregation_mode);
    println!("  Interfaces:     {}", status.interfaces.len());
    for iface in &status.interfaces {
        println!(
            "    {} [{:?}] up={} active={}",
            iface.name, iface.kind, iface.up, iface.health.active
        );
    }
    println!("  Peers:          {}", status.peers.len());
    Ok(())
}

async fn cmd_stats(config: MeshConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let platform: Arc<dyn PlatformPort> = Arc::new(LinuxPlatformPort::new());
    let manager = MeshManager::bootstrap(platform, config).await?;
    match output {
        Some(path) => {
            manager.export_report(&path).await?;
            println!("wrote performance report to {}", path.display());
        }
        None => {
            let report = manager.performance_report().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn cmd_logs(config: MeshConfig, follow: bool, level: &str) -> anyhow::Result<()> {
    std::env::set_var("RUST_LOG", level);
    if follow {
        cmd_start(config).await
    } else {
        let platform: Arc<dyn PlatformPort> = Arc::new(LinuxPlatformPort::new());
        let manager = MeshManager::bootstrap(platform, config).await?;
        let status = manager.status().await;
        tracing::info!(failover_state = ?status.failover_state, "one-shot log snapshot");
        Ok(())
    }
}

async fn cmd_test(interface: &str, duration: u64) -> anyhow::Result<()> {
    let platform = LinuxPlatformPort::new();
    println!("Probing {interface} for {duration}s...");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    let mut probes = 0u32;
    let mut reachable = 0u32;
    while tokio::time::Instant::now() < deadline {
        for target in mesh_engine::metrics::LATENCY_TARGETS {
            probes += 1;
            match platform.probe(interface, target, Duration::from_secs(2)).await {
                Ok(result) if result.reachable => {
                    reachable += 1;
                    println!("  {target}: reachable, rtt={:.1}ms", result.rtt_ms.unwrap_or(0.0));
                }
                Ok(_) => println!("  {target}: unreachable"),
                Err(e) => println!("  {target}: error ({e})"),
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    println!("{reachable}/{probes} probes succeeded");
    Ok(())
}

async fn cmd_failover(config: MeshConfig, from: &str, to: &str) -> anyhow::Result<()> {
    let platform: Arc<dyn PlatformPort> = Arc::new(LinuxPlatformPort::new());
    let manager = MeshManager::bootstrap(platform, config).await?;
    manager.manual_failover(from, to).await;
    println!("Manual failover requested: {from} -> {to}");
    Ok(())
}

fn cmd_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = MeshConfig::default();
    let json = config.to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(&path, &json)?;
            println!("wrote configuration skeleton to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

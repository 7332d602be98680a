//! convoy - multi-node cluster provisioning
//!
//! This is the main CLI entry point for convoy.

use anyhow::Context;
use clap::{Parser, Subcommand};
use convoy::config::{Manifest, DEFAULT_MANIFEST};
use convoy::error::ConvoyError;
use convoy::exec::ShellRunner;
use convoy::{FileLock, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// convoy - provision clusters through docker-machine and a deploy agent
#[derive(Parser)]
#[command(name = "convoy")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Provision multi-node clusters through docker-machine and a deploy agent", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Deployment manifest
    #[arg(short = 'f', long, global = true, default_value = DEFAULT_MANIFEST)]
    manifest: PathBuf,

    /// Seconds to wait for another run holding the manifest lock
    #[arg(long, global = true, default_value = "600")]
    lock_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and deploy every host, then deploy every cluster
    Up,

    /// Destroy every host and cluster node
    Down,

    /// Manage single hosts
    Host {
        #[command(subcommand)]
        command: HostCommands,
    },

    /// Manage clusters
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
}

#[derive(Subcommand)]
enum HostCommands {
    /// Provision a host
    Create {
        /// Host name
        name: String,
    },
    /// Remove a host
    #[command(name = "rm")]
    Destroy {
        /// Host name
        name: String,
    },
    /// Install the deploy agent on a host
    Deploy {
        /// Host name
        name: String,
    },
    /// Check whether a host is provisioned
    Exists {
        /// Host name
        name: String,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Create a cluster and join its nodes
    Deploy {
        /// Cluster name
        name: String,
    },
    /// List declared clusters in join order
    #[command(name = "ls")]
    List,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let directives = log_directives(cli.debug, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let manifest = Manifest::load(&cli.manifest)
        .with_context(|| format!("failed to load manifest {}", cli.manifest.display()))?;
    let runner = ShellRunner::new().with_timeout(manifest.deployment.command_timeout());
    let mut orchestrator = Orchestrator::new(manifest, Arc::new(runner));

    // Read-only commands run without the lock
    match &cli.command {
        Commands::Host {
            command: HostCommands::Exists { name },
        } => {
            let exists = orchestrator.host_exists(name).await?;
            println!("{}", exists);
            if !exists {
                std::process::exit(1);
            }
            return Ok(());
        }
        Commands::Cluster {
            command: ClusterCommands::List,
        } => {
            for cluster in &orchestrator.manifest().clusters {
                let mut cluster = cluster.clone();
                cluster.normalize();
                println!("{} ({})", cluster.name, cluster.kind);
                for node in &cluster.nodes {
                    println!("  {:<20} {:<8} {}", node.name, node.role, node.external_ip);
                }
            }
            return Ok(());
        }
        _ => {}
    }

    let lock = FileLock::new(&cli.manifest, Duration::from_secs(cli.lock_timeout));
    lock.lock().await?;

    let result = tokio::select! {
        result = run(&mut orchestrator, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            Err(ConvoyError::Interrupted("received Ctrl+C".to_string()))
        }
    };

    lock.unlock();
    Ok(result?)
}

/// `RUST_LOG` wins over `--debug`, which wins over the `info` default
fn log_directives(debug: bool, env: Option<String>) -> String {
    match env {
        Some(directives) if !directives.trim().is_empty() => directives,
        _ if debug => "debug".to_string(),
        _ => "info".to_string(),
    }
}

async fn run(orchestrator: &mut Orchestrator, command: Commands) -> convoy::Result<()> {
    match command {
        Commands::Up => orchestrator.up().await,
        Commands::Down => orchestrator.down().await,
        Commands::Host { command } => match command {
            HostCommands::Create { name } => orchestrator.create_host(&name).await,
            HostCommands::Destroy { name } => orchestrator.destroy_host(&name).await,
            HostCommands::Deploy { name } => orchestrator.deploy_host(&name).await,
            HostCommands::Exists { name } => orchestrator.host_exists(&name).await.map(|_| ()),
        },
        Commands::Cluster { command } => match command {
            ClusterCommands::Deploy { name } => orchestrator.deploy_cluster(&name).await,
            ClusterCommands::List => Ok(()),
        },
    }
}

//! webtierd: the webtier daemon.
//!
//! Single binary over all webtier subsystems:
//! - Stack definition (`webtier.toml`) and validation
//! - State store (redb) acting as the local provisioning backend
//! - Router and target sync, behind an HTTP front door
//! - Health monitors
//! - Metrics collector
//! - Fleet controllers (scaling policies + reconciler)
//! - Output publisher
//!
//! # Usage
//!
//! ```text
//! webtierd init
//! webtierd apply --config webtier.toml --data-dir .webtier
//! webtierd route --path /static
//! webtierd run
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod daemon;
mod front_door;

#[derive(Parser)]
#[command(name = "webtierd", about = "Declarative web tier daemon", version)]
struct Cli {
    /// Stack definition file.
    #[arg(long, global = true, default_value = "webtier.toml")]
    config: PathBuf,

    /// Data directory for persistent state.
    #[arg(long, global = true, default_value = ".webtier")]
    data_dir: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a scaffold stack definition.
    Init {
        /// Stack name.
        #[arg(long, default_value = "web")]
        name: String,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Parse and validate the stack, then print the resolved plan.
    Validate,
    /// Provision the stack, launch minimum capacity and publish outputs.
    Apply,
    /// Show how a request path would be routed right now.
    Route {
        #[arg(long)]
        path: String,
    },
    /// Apply, then run monitors, scaling policies and reconcilers until Ctrl-C.
    Run {
        /// Address the front door listens on.
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,

        /// Metrics snapshot interval in seconds.
        #[arg(long, default_value = "60")]
        metrics_interval: u64,

        /// How often monitors and router snapshots follow membership, in seconds.
        #[arg(long, default_value = "5")]
        sync_interval: u64,
    },
    /// Print published stack outputs.
    Outputs,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,webtier=debug"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let ctx = commands::Context {
        config: cli.config,
        data_dir: cli.data_dir,
    };

    match cli.command {
        Command::Init { name, force } => commands::init(&ctx, &name, force),
        Command::Validate => commands::validate(&ctx),
        Command::Apply => commands::apply(&ctx).await.map(|_| ()),
        Command::Route { path } => commands::route(&ctx, &path),
        Command::Run {
            listen,
            metrics_interval,
            sync_interval,
        } => daemon::run(&ctx, listen, metrics_interval, sync_interval).await,
        Command::Outputs => commands::outputs(&ctx),
    }
}

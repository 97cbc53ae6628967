//! CLI (C11, added): `run` starts the coordinator and REST/WS server;
//! `config show|set` inspects or mutates the persisted config directly.
use {
    clap::{Args, Parser, Subcommand},
    std::{net::SocketAddr, path::PathBuf},
};

#[derive(Debug, Parser)]
#[command(name = "soloctl", version, about = "Solo Bitcoin mining coordinator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the coordinator and serve the REST/WebSocket surface.
    Run(RunArgs),
    /// Inspect or mutate the persisted configuration without starting the server.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the persisted configuration as JSON.
    Show,
    /// Set a single `KEY=VALUE` pair and persist it.
    Set { pair: String },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub pool_url: Option<String>,
    #[arg(long)]
    pub pool_port: Option<u16>,
    #[arg(long, env = "SOLOCTL_WALLET")]
    pub wallet: Option<String>,
    #[arg(long)]
    pub workers: Option<usize>,
    #[arg(long = "max-cpu-percent")]
    pub max_cpu_percent: Option<u8>,
    #[arg(long = "stats-dir")]
    pub stats_dir: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,
    /// Start mining immediately instead of waiting for POST /mining/start.
    #[arg(long)]
    pub autostart: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            pool_url: None,
            pool_port: None,
            wallet: None,
            workers: None,
            max_cpu_percent: None,
            stats_dir: None,
            listen: "127.0.0.1:8080".parse().unwrap(),
            autostart: false,
        }
    }
}

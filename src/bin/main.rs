use {
    anyhow::{Context, Result, bail},
    clap::Parser,
    soloctl::{
        cli::{Cli, Command, ConfigAction, RunArgs},
        config::Config,
        coordinator::Coordinator,
        logging,
        server::{self, AppState},
        stats::Stats,
    },
    std::sync::Arc,
    tokio::net::TcpListener,
    tracing::{error, info, warn},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(args).await,
        Command::Config { action } => config_command(action),
    }
}

fn config_command(action: ConfigAction) -> Result<()> {
    let stats_dir = Config::default().stats_dir;
    let mut config = Config::load(&stats_dir);

    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Set { pair } => {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("expected KEY=VALUE, got {pair}"))?;

            match key {
                "pool_url" => config.pool_url = value.to_string(),
                "pool_port" => config.pool_port = value.parse().context("pool_port must be a u16")?,
                "wallet_address" => config.wallet_address = value.to_string(),
                "max_cpu_percent" => config.max_cpu_percent = value.parse::<u8>().context("max_cpu_percent must be 1-100")?.clamp(1, 100),
                "num_workers" => config.num_workers = value.parse().context("num_workers must be a non-negative integer")?,
                other => bail!("unknown config key: {other}"),
            }

            config.save(&stats_dir)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let stats_dir = args.stats_dir.clone().unwrap_or_else(|| Config::default().stats_dir);
    let mut config = Config::load(&stats_dir);

    if let Some(pool_url) = args.pool_url {
        config.pool_url = pool_url;
    }
    if let Some(pool_port) = args.pool_port {
        config.pool_port = pool_port;
    }
    if let Some(wallet) = args.wallet {
        config.wallet_address = wallet;
    }
    if let Some(workers) = args.workers {
        config.num_workers = workers;
    }
    if let Some(max_cpu_percent) = args.max_cpu_percent {
        config.max_cpu_percent = max_cpu_percent.clamp(1, 100);
    }
    config.stats_dir = stats_dir.clone();

    let logs = logging::init(config.log_dir.as_deref());

    let stats = Stats::load(&stats_dir).context("failed to load stats.json; refusing to start and overwrite it")?;

    let coordinator = Arc::new(Coordinator::new(config.clone(), Arc::new(stats)));

    if args.autostart {
        if let Err(error) = coordinator.start_mining().await {
            error!(%error, "autostart failed");
        }
    }

    spawn_snapshot_task(coordinator.clone(), stats_dir.clone());

    let app_state = Arc::new(AppState {
        coordinator: coordinator.clone(),
        logs,
        stats_dir: stats_dir.clone(),
    });
    let router = server::router(app_state);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(address = %args.listen, "REST/WebSocket server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Err(error) = coordinator.stop_mining().await {
        warn!(%error, "error stopping mining during shutdown");
    }
    if let Err(error) = coordinator.stats().save(&stats_dir, coordinator.pool().total_hash_count()) {
        warn!(%error, "failed to save stats.json during shutdown");
    }

    Ok(())
}

fn spawn_snapshot_task(coordinator: Arc<Coordinator>, stats_dir: std::path::PathBuf) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            if !coordinator.is_running() {
                continue;
            }
            let total_hashes = coordinator.pool().total_hash_count();
            if let Err(error) = coordinator.stats().save(&stats_dir, total_hashes) {
                warn!(%error, "periodic stats.json snapshot failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => error!(%error, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

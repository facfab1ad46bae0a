use std::sync::Arc;

use {
    clap::Parser,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    whisper_bus::BusClient,
    whisper_gateway::{Dispatcher, GatewayState, Orchestrator, WorkerPool, server},
    whisper_store::{ChatStore, RedisChatStore, RedisSessionStore, SessionStore},
};

#[derive(Parser)]
#[command(name = "whisper", about = "Whisper — anonymous chat edge gateway")]
struct Cli {
    /// Address to bind to (overrides config value).
    #[arg(long)]
    bind: Option<String>,

    /// Config file path (default: ./whisper.toml, falling back to defaults).
    #[arg(long, env = "WHISPER_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Edge-instance name stored on owned sessions (overrides config).
    #[arg(long)]
    server_name: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Flip the shutdown token on SIGINT or SIGTERM.
fn spawn_signal_handler(state: Arc<GatewayState>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = term.recv() => {},
                    }
                },
                Err(_) => {
                    let _ = ctrl_c.await;
                },
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        state.shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "whisper starting");

    let mut config = match &cli.config {
        Some(path) => whisper_config::load_config(path)?,
        None => whisper_config::discover_and_load()?,
    };
    if let Some(bind) = cli.bind {
        config.listen_addr = bind;
    }
    if let Some(name) = cli.server_name {
        config.server_name = name;
    }

    // Losing either collaborator at startup is fatal; mid-flight loss is
    // surfaced per operation instead, so clients see retryable errors.
    let redis_client = redis::Client::open(config.kv_addr.as_str())?;
    let manager = redis::aio::ConnectionManager::new(redis_client).await?;
    info!(addr = %config.kv_addr, "key-value store connected");

    let bus = Arc::new(BusClient::connect(&config.bus_url).await?);
    info!(url = %config.bus_url, "bus connected");

    let state = GatewayState::new(config);
    let sessions: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(
        manager.clone(),
        state.server_name.clone(),
    ));
    let chats: Arc<dyn ChatStore> = Arc::new(RedisChatStore::new(manager));

    let orchestrator = Orchestrator::new(
        Arc::clone(&state),
        Arc::clone(&sessions),
        chats,
        bus.clone(),
    );
    let mut dispatcher = Dispatcher::new();
    orchestrator.register_handlers(&mut dispatcher);
    orchestrator.install_disconnect_handler().await;

    let pool = WorkerPool::start(
        state.config.worker_pool_size,
        state.config.inbound_queue,
        Arc::new(dispatcher),
    );

    spawn_signal_handler(Arc::clone(&state));
    server::serve(Arc::clone(&state), sessions, pool.jobs()).await?;

    // Listener is down and connections are drained; flush what's left.
    bus.drain().await;
    info!("whisper stopped");
    Ok(())
}

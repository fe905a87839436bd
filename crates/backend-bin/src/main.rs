use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lightnovel_backend::{
    config::{Settings, StorageBackend},
    create_router,
    storage::{FlatFileStorage, MemoryStorage, Storage},
    AppState,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Light-novel account and session server
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the configured listen address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load_from(&cli.config)?;
    init_tracing(&settings);

    let addr = match cli.bind {
        Some(addr) => addr,
        None => settings.bind_addr()?,
    };

    match settings.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, data is lost on shutdown");
            run(MemoryStorage::new(), settings, addr).await
        },
        StorageBackend::File => {
            tracing::info!(path = %settings.storage.path.display(), "using flat-file storage");
            let storage = FlatFileStorage::new(&settings.storage.path)?;
            run(storage, settings, addr).await
        },
    }
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", settings.log_level)));
    let registry = tracing_subscriber::registry().with(filter);
    if settings.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run<S: Storage + Clone + 'static>(
    storage: S,
    settings: Settings,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(storage, settings)?);

    let sweeper = Arc::clone(&state.sessions).spawn_sweeper(state.settings.sweep_interval());
    let lockouts = state.auth_rate_limiter.clone();
    let requests = Arc::clone(&state.rate_limiter);
    let limiter_cleanup = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            lockouts.cleanup();
            requests.cleanup();
        }
    });

    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    limiter_cleanup.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

//! Parley API server

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parley_api::{
    dispatcher::LoggingChannel,
    store::{postgres, ConversationStore, InMemoryStore, PgStore},
    AppState, Config,
};

/// Interval of the presence-record sweep
const PRESENCE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let store: Arc<dyn ConversationStore> = match &config.database_url {
        Some(url) => {
            let pool = postgres::create_pool(url, config.database_max_connections).await?;
            if config.run_migrations {
                postgres::run_migrations(&pool).await?;
                info!("Database migrations applied");
            }
            info!("Using PostgreSQL store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            info!("DATABASE_URL not set; using in-memory store (state is lost on restart)");
            Arc::new(InMemoryStore::new())
        }
    };

    let state = AppState::new(config.clone(), store, Arc::new(LoggingChannel));
    state.presence.spawn_sweeper(PRESENCE_SWEEP_INTERVAL);

    let app = parley_api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides the default filter
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_api=debug,tower_http=debug"));

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

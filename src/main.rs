use std::sync::Arc;
use std::time::Duration;

use axum_datadog::{Config, StatsD};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod handlers;
mod server;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Request instrumentation and ad-hoc metrics.
    pub statsd: Arc<StatsD>,

    pub users: handlers::users::UserStore,
}

/// How often buffered metric lines are pushed to the agent.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // ── 1. Resolve config ────────────────────────────────────────
    let config = match std::env::var("AXUM_DATADOG_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::from_env()?,
    };
    tracing::info!(
        host = %config.host,
        port = config.port,
        namespace = ?config.namespace,
        "sending metrics to dogstatsd"
    );

    // ── 2. Build shared state ────────────────────────────────────
    let statsd = Arc::new(StatsD::new(config)?);
    let state = Arc::new(AppState {
        statsd: Arc::clone(&statsd),
        users: handlers::users::UserStore::default(),
    });

    // ── 3. Periodic flush ────────────────────────────────────────
    let flusher = {
        let statsd = Arc::clone(&statsd);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(FLUSH_INTERVAL);
            loop {
                tick.tick().await;
                statsd.flush();
            }
        })
    };

    // ── 4. Bind & serve ──────────────────────────────────────────
    let app = server::create_router(state);
    let addr = "0.0.0.0:3000";
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    flusher.abort();
    statsd.flush();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

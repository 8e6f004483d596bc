mod config;
mod game;
mod metrics;
mod net;
mod util;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{GameSettings, ServerConfig};
use crate::game::input_buffer::InputBuffer;
use crate::metrics::Metrics;
use crate::net::http::AppState;
use crate::net::session::{Command, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    info!("Tank Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("invalid configuration: {e}");
    }
    info!(
        "Configuration loaded: {}:{} (metrics on :{})",
        config.bind_address, config.port, config.metrics_port
    );

    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    // One engine task owns the simulation; sockets talk to it through
    // the command channel and the input buffer
    let (command_tx, command_rx) = mpsc::unbounded_channel::<Command>();
    let inputs = InputBuffer::default();
    let input_sender = inputs.sender();

    let engine = Engine::new(GameSettings::default(), metrics.clone());
    let engine_task = tokio::spawn(net::session::run(engine, command_rx, inputs));

    let app_state = Arc::new(AppState {
        commands: command_tx.clone(),
        inputs: input_sender,
        metrics: metrics.clone(),
    });
    let app = net::http::router(app_state, &config.static_dir);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready on http://{addr} (WebSocket on /ws)");

    let shutdown_tx = command_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(Command::Shutdown);
        })
        .await?;

    // The engine runs one last tick and broadcast before exiting
    let _ = engine_task.await;
    info!("Server stopped");

    Ok(())
}

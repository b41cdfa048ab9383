use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sampler_api::config::ServerConfig;
use sampler_api::router::build_app_router;
use sampler_api::state::AppState;
use sampler_api::ws;
use sampler_comfyui::api::ComfyUIApi;
use sampler_comfyui::client::ComfyUIClient;
use sampler_comfyui::stream::ComfyUIStream;
use sampler_db::store::PgJobStore;
use sampler_events::EventBus;
use sampler_pipeline::fs::TokioFileSystem;
use sampler_pipeline::loader::DirWorkflowLoader;
use sampler_pipeline::planner::JobPlanner;
use sampler_pipeline::JobExecutor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sampler_api=debug,sampler_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        comfyui_url = %config.comfyui_url,
        sample_dir = %config.sample_dir.display(),
        workflow_dir = %config.workflow_dir.display(),
        "Loaded server configuration",
    );

    // --- Database ---
    let pool = sampler_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    sampler_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    sampler_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    let store = Arc::new(PgJobStore::new(pool));

    // --- ComfyUI ---
    // The REST client and the WebSocket share one client id so ComfyUI
    // routes execution events for our prompts to our socket.
    let ws_client = ComfyUIClient::with_random_id(config.comfyui_ws_url.clone());
    let api = Arc::new(ComfyUIApi::new(config.comfyui_url.clone(), ws_client.client_id()));
    let stream = Arc::new(ComfyUIStream::new(ws_client));

    // --- Pipeline ---
    let event_bus = Arc::new(EventBus::default());
    let loader = Arc::new(DirWorkflowLoader::new(config.workflow_dir.clone()));
    let executor = Arc::new(JobExecutor::new(
        store.clone(),
        api.clone(),
        stream,
        loader.clone(),
        Arc::new(TokioFileSystem),
        Arc::clone(&event_bus),
        config.executor_config(),
    ));
    let planner = Arc::new(JobPlanner::new(store.clone(), api, loader));

    executor.start().await;

    // --- WebSocket feed ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let feed_handle = ws::start_event_feed(&event_bus, Arc::clone(&ws_manager));
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- App state ---
    let state = AppState {
        store,
        executor: Arc::clone(&executor),
        planner,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    server.await.context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, executor.stop()).await.is_err() {
        tracing::warn!("Executor did not stop within the shutdown timeout");
    }

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    // The feed ends once every bus sender is gone; the executor holds one.
    feed_handle.abort();
    heartbeat_handle.abort();

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Resolve on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

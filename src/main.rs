//! # Audio Relay Backend - Main Application Entry Point
//!
//! Sets up the Actix-web server hosting the real-time PCM audio relay:
//!
//! - **config**: layered configuration (TOML file + environment variables)
//! - **state**: shared state — config, session registry, metrics
//! - **relay**: the streaming relay engine (classifier, gate, session,
//!   registry, persistence writer)
//! - **websocket**: one connection coordinator actor per client
//! - **health / handlers / middleware**: operational HTTP surface
//!
//! Shutdown is graceful by contract: on SIGINT/SIGTERM the server stops
//! accepting work, every in-flight coordinator reaches its teardown path,
//! and main waits for the registry to drain — all sessions removed and all
//! pending WAV flushes finished — before the process exits.

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod relay;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer, middleware::Logger};
use anyhow::{Context, Result};
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set by the signal handler task; polled by the main task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// How long the shutdown path waits for live sessions and pending WAV
/// flushes before giving up and exiting anyway.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-relay-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Relay settings: classifier={}, silence_threshold={}, max_silence_secs={}",
        config.relay.classifier, config.relay.silence_threshold, config.relay.max_silence_secs
    );

    // The output directory must exist before the first session tears down
    std::fs::create_dir_all(&config.storage.output_dir)
        .with_context(|| format!("Failed to create output directory '{}'", config.storage.output_dir))?;
    info!("Session audio will be saved under '{}'", config.storage.output_dir);

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new({
        let app_state = app_state.clone();
        move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .app_data(web::Data::new(app_state.clone()))
                .wrap(cors)
                .wrap(Logger::default())
                .wrap(middleware::MetricsMiddleware)
                .wrap(middleware::RequestLogging)
                .route("/ws/audio", web::get().to(websocket::audio_relay))
                .service(
                    web::scope("/api/v1")
                        .route("/health", web::get().to(health::health_check))
                        .route("/metrics", web::get().to(health::detailed_metrics))
                        .route("/sessions", web::get().to(health::active_sessions))
                        .route("/config", web::get().to(handlers::get_config))
                        .route("/config", web::put().to(handlers::update_config))
                )
                .route("/health", web::get().to(health::health_check))
        }
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    drain_sessions(&app_state).await;

    info!("Server stopped gracefully");
    Ok(())
}

/// Structured console logging via tracing. `RUST_LOG` controls the filter;
/// the default keeps our own spans at debug and actix at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_relay_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT on a background task and set the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for every coordinator to finish its teardown flush. Sessions that
/// survived the graceful server stop still hold unpersisted audio; exiting
/// before their WAV writes land would lose it.
async fn drain_sessions(app_state: &AppState) {
    let deadline = Instant::now() + DRAIN_TIMEOUT;

    while !app_state.registry.is_idle() {
        if Instant::now() >= deadline {
            warn!(
                active_sessions = app_state.registry.active_count(),
                pending_flushes = app_state.registry.pending_flushes(),
                "Drain timeout reached, exiting with sessions unflushed"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("All sessions drained");
}

//! # Audio Emotion Backend - Main Application Entry Point
//!
//! Sets up the Actix-web HTTP server that classifies the emotion expressed
//! in uploaded audio clips.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared application state and request metrics
//! - **models**: Read-only registry of pretrained emotion classifiers
//! - **pipeline**: The per-request prediction pipeline (decode, trim,
//!   feature extraction, dispatch, normalization)
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request metrics collection
//! - **handlers**: HTTP request handlers for the API endpoints
//! - **error**: The prediction error taxonomy and its HTTP mapping
//!
//! All model artifacts load once at startup; if any artifact is missing or
//! inconsistent the process exits instead of serving requests it cannot
//! handle.

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod models;
mod pipeline;
mod state;

use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use models::ModelRegistry;
use pipeline::FeatureExtractor;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown flag set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audio-emotion-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // Load every model artifact up front. A broken artifact directory is a
    // deployment error; refuse to start rather than fail every request.
    let registry = ModelRegistry::load(
        &config.artifacts.model_dir,
        config.extractor.feature_dimension,
    )
    .with_context(|| {
        format!(
            "failed to load model artifacts from '{}'",
            config.artifacts.model_dir.display()
        )
    })?;
    info!(
        models = registry.len(),
        emotions = registry.labels().num_classes(),
        feature_dimension = registry.feature_dimension(),
        "Model registry loaded"
    );

    let registry = Arc::new(registry);
    let extractor = Arc::new(FeatureExtractor::new(
        &config.extractor,
        config.extraction_concurrency(),
    ));

    let app_state = AppState::new(config.clone(), registry, extractor);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/models", web::get().to(handlers::list_models))
                    .route("/predict", web::post().to(handlers::predict)),
            )
            .route("/", web::get().to(index))
            .route("/health", web::get().to(health::health_check))
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

    info!("Server stopped gracefully");
    Ok(())
}

/// Service banner at the root path.
async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "service": "audio-emotion-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/api/health", "/api/metrics", "/api/models", "/api/predict"]
    }))
}

/// Structured logging to the console; `RUST_LOG` overrides the defaults.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_emotion_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
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

/// Poll the shutdown flag; cheap enough at a 100ms interval.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

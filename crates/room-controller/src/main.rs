//! Room Controller
//!
//! Orchestrates media nodes for a cascaded SFU cluster.
//!
//! # Servers
//!
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing and the Prometheus metrics recorder
//! 3. Build the load balancer from `RC_LB_STRATEGIES`
//! 4. Register media nodes and open their control connections
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use common::secret::ExposeSecret;
use room_controller::config::Config;
use room_controller::loadbalance::{LbStrategyFactory, LoadBalancer};
use room_controller::media::{MediaCluster, MediaNode, NodeConnector, WebSocketConnector};
use room_controller::observability::metrics::init_metrics_recorder;
use room_controller::observability::{health_router, HealthState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration decides the log format, so it is loaded first and any
    // failure is reported once tracing is up.
    let config = Config::from_env();
    let json_logs = config
        .as_ref()
        .is_ok_and(|c| c.observability.json_logs);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_controller=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    info!("Starting Room Controller");

    let config = config.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        rc_id = %config.rc_id,
        media_nodes = config.media_nodes.len(),
        lb_strategies = ?config.lb_strategies,
        request_timeout_ms = config.request_timeout.as_millis(),
        health_bind_address = %config.health_bind_address,
        "Configuration loaded successfully"
    );

    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;

    let factory = LbStrategyFactory::new(&config.lb_strategies)
        .map_err(|e| {
            error!(error = %e, "Invalid load balancing configuration");
            e
        })?
        .with_geo_max_distance_km(config.geo_max_distance_km);
    let load_balancer = LoadBalancer::new(&factory);
    info!(precedence = ?load_balancer.precedence(), "Load balancer configured");

    let cluster = Arc::new(MediaCluster::new(load_balancer));
    let connector: Arc<dyn NodeConnector> = Arc::new(WebSocketConnector::default());
    for node_config in &config.media_nodes {
        if node_config.secret.expose_secret().is_empty() {
            warn!(node_id = %node_config.id, "Media node configured with an empty secret");
        }
        let node = MediaNode::new(
            node_config.to_media_node_options(config.request_timeout),
            Arc::clone(&connector),
        );
        if !cluster.add_node(Arc::clone(&node)) {
            warn!(node_id = %node_config.id, "Duplicate media node id, ignoring");
            continue;
        }
        if let Err(e) = node.connection() {
            warn!(node_id = %node.id(), error = %e, "Failed to start media node connection");
        }
    }

    let health_state = Arc::new(HealthState::new());
    health_state.set_media_nodes(cluster.len());

    let shutdown_token = CancellationToken::new();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let app = health_router(Arc::clone(&health_state), Some(prometheus_handle))
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;

    let health_shutdown_token = shutdown_token.child_token();
    let health_task = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    health_state.set_ready();
    info!("Room Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so k8s stops sending traffic
    health_state.set_not_ready();

    cluster.close();
    shutdown_token.cancel();
    if let Err(e) = health_task.await {
        warn!(error = %e, "Health server task ended abnormally");
    }

    info!("Room Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Swap attempts and their outcome classification
//! - Signing requests
//! - Wallet connection status and refreshes

use crate::error::{BridgeError, BridgeResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec, CounterVec,
    Encoder, Gauge, GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Swap metrics
    pub static ref SWAPS_STARTED: CounterVec = register_counter_vec!(
        "stellar_bridge_swaps_started_total",
        "Total swap attempts started by settlement path",
        &["settlement"]
    ).unwrap();

    pub static ref SWAPS_SUCCEEDED: CounterVec = register_counter_vec!(
        "stellar_bridge_swaps_succeeded_total",
        "Total swap attempts settled successfully",
        &["settlement"]
    ).unwrap();

    pub static ref SWAPS_FAILED: CounterVec = register_counter_vec!(
        "stellar_bridge_swaps_failed_total",
        "Total failed swap attempts by classification",
        &["settlement", "classification"]
    ).unwrap();

    pub static ref SWAP_LATENCY: HistogramVec = register_histogram_vec!(
        "stellar_bridge_swap_latency_seconds",
        "Time from request to outcome",
        &["settlement"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 180.0]
    ).unwrap();

    pub static ref SWAPS_IN_FLIGHT: Gauge = register_gauge!(
        "stellar_bridge_swaps_in_flight",
        "Swap attempts not yet in a terminal stage"
    ).unwrap();

    // Signing metrics
    pub static ref SIGNING_REQUESTS: CounterVec = register_counter_vec!(
        "stellar_bridge_signing_requests_total",
        "Signature requests by result",
        &["result"]
    ).unwrap();

    // Wallet metrics
    pub static ref WALLET_CONNECTED: GaugeVec = register_gauge_vec!(
        "stellar_bridge_wallet_connected",
        "Wallet connection status (1=connected, 0=disconnected)",
        &["chain"]
    ).unwrap();

    pub static ref WALLET_REFRESHES: CounterVec = register_counter_vec!(
        "stellar_bridge_wallet_refreshes_total",
        "Total wallet snapshot refreshes",
        &["chain"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

pub async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Encode the default registry in the Prometheus text format
pub fn render() -> BridgeResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| BridgeError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| BridgeError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_swap_started(settlement: &str) {
    SWAPS_STARTED.with_label_values(&[settlement]).inc();
}

pub fn record_swap_succeeded(settlement: &str, latency_secs: f64) {
    SWAPS_SUCCEEDED.with_label_values(&[settlement]).inc();
    SWAP_LATENCY
        .with_label_values(&[settlement])
        .observe(latency_secs);
}

pub fn record_swap_failed(settlement: &str, classification: &str, latency_secs: f64) {
    SWAPS_FAILED
        .with_label_values(&[settlement, classification])
        .inc();
    SWAP_LATENCY
        .with_label_values(&[settlement])
        .observe(latency_secs);
}

pub fn record_swaps_in_flight(count: usize) {
    SWAPS_IN_FLIGHT.set(count as f64);
}

pub fn record_signing(result: &str) {
    SIGNING_REQUESTS.with_label_values(&[result]).inc();
}

pub fn record_wallet_refresh(chain: &str, connected: bool) {
    WALLET_REFRESHES.with_label_values(&[chain]).inc();
    WALLET_CONNECTED
        .with_label_values(&[chain])
        .set(if connected { 1.0 } else { 0.0 });
}

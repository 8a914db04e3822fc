//! HTTP API used by the bridge UI

use crate::config::ApiConfig;
use crate::error::{BridgeError, BridgeResult, SwapFailure};
use crate::metrics;
use crate::swap::{SwapOrchestrator, SwapOutcome, SwapRequest};
use crate::sync::WalletSynchronizer;
use crate::tokens::{self, TokenDescriptor};
use crate::wallet::{EvmWallet, TransactionSigner, WalletChain, WalletSnapshot};

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub synchronizer: Arc<WalletSynchronizer>,
    pub orchestrator: Arc<SwapOrchestrator>,
    pub signer: Arc<dyn TransactionSigner>,
    /// Source wallet, for chain switching
    pub evm_wallet: Option<Arc<EvmWallet>>,
    pub metrics_enabled: bool,
}

/// Build the API routes
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/wallets", get(get_wallets))
        .route("/wallets/:chain", get(get_wallet))
        .route("/wallets/:chain/refresh", post(refresh_wallet))
        .route("/wallets/:chain/connect", post(connect_wallet))
        .route("/wallets/evm/switch", post(switch_evm_chain))
        .route("/tokens", get(get_tokens))
        .route("/swaps", post(create_swap))
        .route("/swaps/:id", get(get_swap));

    if state.metrics_enabled {
        app = app.route("/metrics", get(metrics::metrics_handler));
    }

    app.with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> BridgeResult<()> {
    let mut app = router(state).layer(TraceLayer::new_for_http());

    if let Some(origin) = &config.allowed_origin {
        let origin = origin
            .parse::<HeaderValue>()
            .map_err(|e| BridgeError::Config(format!("Invalid api.allowed_origin: {}", e)))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| BridgeError::Internal(format!("API server failed: {}", e)))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stellar_network: state.orchestrator.network().name(),
        swaps_in_flight: state.orchestrator.tracker().in_flight(),
        tracked_swaps: state.orchestrator.tracker().len(),
    })
}

async fn get_wallets(State(state): State<AppState>) -> impl IntoResponse {
    let wallets: BTreeMap<&'static str, WalletSnapshot> = WalletChain::ALL
        .into_iter()
        .map(|chain| (chain.as_str(), (*state.synchronizer.snapshot(chain)).clone()))
        .collect();
    Json(wallets)
}

async fn get_wallet(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> Result<Json<WalletSnapshot>, ApiError> {
    let chain: WalletChain = chain.parse()?;
    Ok(Json((*state.synchronizer.snapshot(chain)).clone()))
}

async fn refresh_wallet(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> Result<Json<WalletSnapshot>, ApiError> {
    let chain: WalletChain = chain.parse()?;
    let snapshot = state.synchronizer.refresh(chain).await?;
    Ok(Json((*snapshot).clone()))
}

async fn connect_wallet(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> Result<Json<WalletSnapshot>, ApiError> {
    let chain: WalletChain = chain.parse()?;
    let snapshot = state.synchronizer.connect(chain).await?;
    Ok(Json((*snapshot).clone()))
}

async fn switch_evm_chain(
    State(state): State<AppState>,
    Json(request): Json<SwitchChainRequest>,
) -> Result<Json<WalletSnapshot>, ApiError> {
    let wallet = state
        .evm_wallet
        .as_ref()
        .ok_or_else(|| BridgeError::UnknownChain(WalletChain::Evm.to_string()))?;
    wallet
        .switch_chain(&request.chain_id)
        .await
        .map_err(BridgeError::from)?;

    let snapshot = state.synchronizer.refresh(WalletChain::Evm).await?;
    Ok(Json((*snapshot).clone()))
}

async fn get_tokens() -> Json<&'static [TokenDescriptor]> {
    Json(tokens::all())
}

/// Run a swap. Signing happens inside this request, so the UI must call it
/// straight from the user's action.
async fn create_swap(
    State(state): State<AppState>,
    Json(request): Json<SwapRequest>,
) -> impl IntoResponse {
    let outcome = state
        .orchestrator
        .execute_swap(&request, state.signer.as_ref())
        .await;

    let status = if outcome.is_success() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(SwapResponse::from(&outcome)))
}

async fn get_swap(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::BadRequest(format!("Invalid attempt id {id}")))?;
    let attempt = state
        .orchestrator
        .tracker()
        .get(&id)
        .ok_or(BridgeError::SwapNotFound { id: id.to_string() })?;
    Ok(Json(attempt))
}

#[derive(Debug, Deserialize)]
struct SwitchChainRequest {
    chain_id: String,
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    stellar_network: &'static str,
    swaps_in_flight: usize,
    tracked_swaps: usize,
}

#[derive(Debug, Serialize)]
struct SwapResponse {
    attempt_id: Uuid,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<String>,
    simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    classification: Option<&'static str>,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<&SwapOutcome> for SwapResponse {
    fn from(outcome: &SwapOutcome) -> Self {
        let failure = outcome.failure();
        Self {
            attempt_id: outcome.attempt_id(),
            status: if outcome.is_success() {
                "success"
            } else {
                "failure"
            },
            tx_hash: outcome.tx_hash().map(str::to_string),
            simulated: outcome.is_simulated(),
            classification: failure.map(SwapFailure::kind),
            retryable: failure.is_some_and(SwapFailure::is_retryable),
            message: outcome.reason().map(str::to_string),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Errors surfaced by API handlers
enum ApiError {
    BadRequest(String),
    Bridge(BridgeError),
}

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        ApiError::Bridge(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Bridge(e) => {
                let status = match &e {
                    BridgeError::UnknownChain(_) | BridgeError::SwapNotFound { .. } => {
                        StatusCode::NOT_FOUND
                    }
                    BridgeError::Connection(_) => StatusCode::CONFLICT,
                    BridgeError::Ledger(_) => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_settings;
    use crate::config::SimulationConfig;
    use crate::error::ConnectionError;
    use crate::ledger::MockLedger;
    use crate::swap::SwapTracker;
    use crate::wallet::eip1193::MockEip1193Provider;
    use crate::wallet::{MockTransactionSigner, MockWalletAdapter, WalletAdapter, WalletDetails};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn evm_adapter() -> MockWalletAdapter {
        let mut adapter = MockWalletAdapter::new();
        adapter.expect_chain().return_const(WalletChain::Evm);
        adapter.expect_query_state().returning(|| {
            WalletSnapshot::connected(WalletDetails {
                permission_granted: true,
                address: Some("0xabc".to_string()),
                network_id: Some("0x89".to_string()),
                network_name: Some("Polygon Mainnet".to_string()),
                balance: Some("10.0000".to_string()),
            })
        });
        adapter
            .expect_request_connection()
            .returning(|| Err(ConnectionError::UserDeclined));
        adapter
    }

    fn state() -> AppState {
        let mut settings = sample_settings();
        settings.simulation = SimulationConfig {
            success_rate: 1.0,
            latency_ms: 0,
        };

        let adapters: Vec<Arc<dyn WalletAdapter>> = vec![Arc::new(evm_adapter())];
        let synchronizer = Arc::new(WalletSynchronizer::new(
            adapters,
            Duration::from_secs(3600),
        ));

        let mut ledger = MockLedger::new();
        ledger.expect_load_account().times(0);
        ledger.expect_submit_transaction().times(0);
        let mut signer = MockTransactionSigner::new();
        signer.expect_sign().times(0);

        let orchestrator = Arc::new(SwapOrchestrator::new(
            &settings,
            Arc::new(ledger),
            synchronizer.clone(),
            Arc::new(SwapTracker::new()),
        ));

        AppState {
            synchronizer,
            orchestrator,
            signer: Arc::new(signer),
            evm_wallet: None,
            metrics_enabled: true,
        }
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, json) = send(router(state()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["stellar_network"], "TESTNET");
        assert_eq!(json["tracked_swaps"], 0);
    }

    #[tokio::test]
    async fn test_wallet_snapshots() {
        let state = state();

        let (status, json) = send(router(state.clone()), "GET", "/wallets", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["evm"]["connected"], false);
        assert_eq!(json["stellar"]["connected"], false);

        let (status, json) = send(router(state.clone()), "POST", "/wallets/evm/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["address"], "0xabc");

        let (_, json) = send(router(state), "GET", "/wallets/evm", None).await;
        assert_eq!(json["connected"], true);
        assert_eq!(json["balance"], "10.0000");
    }

    #[tokio::test]
    async fn test_unknown_wallet_chain() {
        let (status, json) = send(router(state()), "GET", "/wallets/solana", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("solana"));
    }

    #[tokio::test]
    async fn test_connect_declined() {
        let (status, json) = send(router(state()), "POST", "/wallets/evm/connect", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("rejected"));
    }

    #[tokio::test]
    async fn test_switch_chain() {
        let mut provider = MockEip1193Provider::new();
        provider
            .expect_switch_chain()
            .withf(|id| id == "0xa4b1")
            .returning(|id| Err(ConnectionError::ChainNotAdded(id.to_string())));

        let mut state = state();
        state.evm_wallet = Some(Arc::new(EvmWallet::new(Arc::new(provider))));

        let body = r#"{"chain_id": "0xa4b1"}"#;
        let (status, json) = send(router(state), "POST", "/wallets/evm/switch", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("0xa4b1"));
    }

    #[tokio::test]
    async fn test_tokens() {
        let (status, json) = send(router(state()), "GET", "/tokens", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["code"] == "XLM" && t["is_native"] == true));
    }

    #[tokio::test]
    async fn test_swap_rejected() {
        let body = r#"{"from_network": "stellar", "to_network": "stellar",
                       "token_code": "XLM", "amount": "1", "source_address": "GABC"}"#;
        let (status, json) = send(router(state()), "POST", "/swaps", Some(body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["status"], "failure");
        assert_eq!(json["classification"], "same_network");
        assert_eq!(json["retryable"], false);
        assert_eq!(
            json["message"],
            "Choose different source and destination networks."
        );
        assert!(json["attempt_id"].as_str().is_some());
        assert!(json.get("tx_hash").is_none());
    }

    #[tokio::test]
    async fn test_simulated_swap_and_lookup() {
        let state = state();
        state.synchronizer.refresh(WalletChain::Evm).await.unwrap();

        let body = r#"{"from_network": "polygon", "to_network": "solana",
                       "token_code": "USDC", "amount": "2.5", "source_address": "0xabc"}"#;
        let (status, json) = send(router(state.clone()), "POST", "/swaps", Some(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["simulated"], true);
        assert!(json.get("message").is_none());

        let (_, health) = send(router(state.clone()), "GET", "/health", None).await;
        assert_eq!(health["tracked_swaps"], 1);

        let id = json["attempt_id"].as_str().unwrap().to_string();
        let (status, json) = send(router(state), "GET", &format!("/swaps/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["stage"], "succeeded");
        assert_eq!(json["request"]["token_code"], "USDC");
    }

    #[tokio::test]
    async fn test_swap_lookup_errors() {
        let (status, _) = send(router(state()), "GET", "/swaps/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/swaps/{}", Uuid::new_v4());
        let (status, _) = send(router(state()), "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let app = router(state());
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

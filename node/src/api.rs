//! # REST API
//!
//! Builds the axum router that exposes one swap deployment over HTTP.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                       | Description                        |
//! |--------|----------------------------|------------------------------------|
//! | GET    | `/health`                  | Liveness probe                     |
//! | GET    | `/status`                  | Deployment summary and reserve     |
//! | GET    | `/balances/:account/:rank` | One balance                        |
//! | GET    | `/allowance/:holder`       | Whether the holder approved swaps  |
//! | POST   | `/approve`                 | Grant or revoke swap approval      |
//! | POST   | `/value-check`             | Value gate preflight               |
//! | POST   | `/convert`                 | Run a conversion                   |
//!
//! Every mutation runs on a copy of the ledger under the ledger lock. The
//! copy replaces the live ledger only after it has been persisted, so a
//! storage failure never leaves memory ahead of disk. The live ledger holds
//! no event history (saves move it to the store's log), so the copy costs
//! the same however long the node has run.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use gacha_contracts::{ConversionReceipt, ConversionRequest, SourceEntry, SwapEngine, SwapError};
use gacha_protocol::ledger::{Address, Amount, LedgerError, MultiTokenLedger, Rank};
use gacha_protocol::storage::{DbError, LedgerDb};

use crate::deployment::Deployment;
use crate::metrics::{SharedMetrics, SwapMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    pub deployment: Arc<Deployment>,
    pub engine: Arc<SwapEngine>,
    /// The live ledger. One lock serializes every read-modify-write.
    pub ledger: Arc<Mutex<MultiTokenLedger>>,
    pub db: LedgerDb,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Runs `f` against a working copy of the ledger and commits the copy
    /// only if `f` succeeds and the snapshot is saved.
    fn mutate<T, E>(&self, f: impl FnOnce(&mut MultiTokenLedger) -> Result<T, E>) -> Result<T, ApiError>
    where
        ApiError: From<E>,
    {
        let mut live = self.ledger.lock();
        let mut working = live.clone();
        let out = f(&mut working)?;
        self.db.save_ledger(&mut working)?;
        *live = working;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/balances/:account/:rank", get(balance_handler))
        .route("/allowance/:holder", get(allowance_handler))
        .route("/approve", post(approve_handler))
        .route("/value-check", post(value_check_handler))
        .route("/convert", post(convert_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub collection: String,
    pub symbol: String,
    pub owner: Address,
    pub reserve: Address,
    pub operator: Address,
    /// `(rank, weight)` pairs in rank order.
    pub weights: Vec<(Rank, u64)>,
    /// Reserve inventory of every configured rank.
    pub reserve_stock: Vec<(Rank, Amount)>,
    pub accounts: usize,
    /// Hex-encoded BLAKE3 root of the ledger state.
    pub state_root: String,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account: Address,
    pub rank: Rank,
    pub balance: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllowanceResponse {
    pub holder: Address,
    pub operator: Address,
    pub approved: bool,
}

/// Body of `POST /approve`. `approved` defaults to `true`.
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub holder: Address,
    #[serde(default = "default_true")]
    pub approved: bool,
}

fn default_true() -> bool {
    true
}

/// Body of `POST /value-check`.
#[derive(Debug, Deserialize)]
pub struct ValueCheckRequest {
    pub sources: Vec<SourceEntry>,
    pub destination: Rank,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValueCheckResponse {
    pub sufficient: bool,
    pub offered: u64,
    pub required: u64,
}

/// Body of `POST /convert`.
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub holder: Address,
    pub sources: Vec<SourceEntry>,
    pub destination: Rank,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable failure kind, e.g. `insufficient_value`.
    pub kind: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures a handler can return; each maps to one HTTP status.
#[derive(Debug)]
pub enum ApiError {
    Swap(SwapError),
    Storage(DbError),
    BadRequest(String),
}

impl From<SwapError> for ApiError {
    fn from(e: SwapError) -> Self {
        ApiError::Swap(e)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::Swap(SwapError::Ledger(e))
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        ApiError::Storage(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Swap(e) => match e {
                SwapError::UnknownRank(_)
                | SwapError::InvalidRequest(_)
                | SwapError::ArithmeticOverflow => StatusCode::BAD_REQUEST,
                SwapError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
                SwapError::InsufficientValue { .. } | SwapError::ReserveDepleted { .. } => {
                    StatusCode::CONFLICT
                }
                SwapError::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SwapError::Ledger(l) => match l {
                    LedgerError::NotOwner { .. } | LedgerError::NotApproved { .. } => {
                        StatusCode::FORBIDDEN
                    }
                    LedgerError::InsufficientBalance { .. } | LedgerError::Overflow { .. } => {
                        StatusCode::CONFLICT
                    }
                    LedgerError::LengthMismatch { .. }
                    | LedgerError::SelfApproval(_)
                    | LedgerError::InvalidAddress => StatusCode::BAD_REQUEST,
                },
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Swap(e) => e.kind(),
            ApiError::Storage(_) => "storage",
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Swap(e) => write!(f, "{e}"),
            ApiError::Storage(e) => write!(f, "storage error: {e}"),
            ApiError::BadRequest(msg) => write!(f, "{msg}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: deployment summary plus current reserve inventory.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ledger = state.ledger.lock();
    let table = state.engine.table();

    let resp = StatusResponse {
        version: state.version.clone(),
        collection: state.deployment.collection.name.clone(),
        symbol: state.deployment.collection.symbol.clone(),
        owner: state.deployment.owner.clone(),
        reserve: state.engine.reserve().to_string(),
        operator: state.engine.operator().to_string(),
        weights: table.entries(),
        reserve_stock: table
            .ranks()
            .map(|rank| (rank, state.engine.reserve_stock(&*ledger, rank)))
            .collect(),
        accounts: ledger.account_count(),
        state_root: ledger.state_root_hex(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /balances/:account/:rank`: one balance. Accepts `8` or `rank8`.
async fn balance_handler(
    Path((account, rank)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let rank: Rank = rank
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid rank '{rank}': {e}")))?;
    let balance = state.ledger.lock().balance_of(&account, rank);
    Ok(Json(BalanceResponse {
        account,
        rank,
        balance,
    }))
}

/// `GET /allowance/:holder`: whether the holder approved the operator.
async fn allowance_handler(
    Path(holder): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let approved = state.engine.allowance_check(&*state.ledger.lock(), &holder);
    Json(AllowanceResponse {
        holder,
        operator: state.engine.operator().to_string(),
        approved,
    })
}

/// `POST /approve`: grants or revokes the operator's approval.
async fn approve_handler(
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<AllowanceResponse>, ApiError> {
    let operator = state.engine.operator().to_string();
    state.mutate(|ledger| ledger.set_approval_for_all(&req.holder, &operator, req.approved))?;

    tracing::info!(holder = %req.holder, %operator, approved = req.approved, "approval updated");
    Ok(Json(AllowanceResponse {
        holder: req.holder,
        operator,
        approved: req.approved,
    }))
}

/// `POST /value-check`: runs the value gate only. Reads no ledger state.
async fn value_check_handler(
    State(state): State<AppState>,
    Json(req): Json<ValueCheckRequest>,
) -> Result<Json<ValueCheckResponse>, ApiError> {
    let valuation = state.engine.valuate(&req.sources, req.destination)?;
    Ok(Json(ValueCheckResponse {
        sufficient: valuation.is_sufficient(),
        offered: valuation.offered,
        required: valuation.required,
    }))
}

/// `POST /convert`: runs a full conversion and returns its receipt.
async fn convert_handler(
    State(state): State<AppState>,
    Json(req): Json<ConvertRequest>,
) -> Result<Json<ConversionReceipt>, ApiError> {
    let request = ConversionRequest {
        sources: req.sources,
        destination: req.destination,
    };

    let started = Instant::now();
    let engine = Arc::clone(&state.engine);
    let outcome = state.mutate(|ledger| engine.convert(ledger, &req.holder, &request));

    record_conversion(&state.metrics, &outcome, started.elapsed().as_secs_f64());

    Ok(Json(outcome?))
}

/// Counts a conversion once its save has succeeded or failed. A storage
/// failure rolls the conversion back, so it is a rejection.
fn record_conversion(metrics: &SwapMetrics, outcome: &Result<ConversionReceipt, ApiError>, elapsed_secs: f64) {
    match outcome {
        Ok(receipt) => metrics.observe_completed(receipt, elapsed_secs),
        Err(e) => metrics.observe_rejected(e.kind(), elapsed_secs),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

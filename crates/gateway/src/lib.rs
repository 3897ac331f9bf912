//! HTTP API gateway for Powergate.
//!
//! Exposes the metered chat endpoint plus the read surfaces: model
//! catalogue, balance, and ledger audit trail. Callers identify
//! themselves with an `x-user-id` header; the gateway trusts it and
//! leaves authentication to the deployment in front of it.
//!
//! Built on Axum for high performance async HTTP.

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, extract::State};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;
use tracing::info;

use powergate_core::error::{Error, LedgerError, ProxyError};
use powergate_core::ledger::{CreditLedger, ModelStore};
use powergate_core::message::ChatRequest;
use powergate_proxy::{ChatOutcome, MeteredProxy};

const USER_ID_HEADER: &str = "x-user-id";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub proxy: MeteredProxy,
    pub ledger: Arc<dyn CreditLedger>,
    pub models: Arc<dyn ModelStore>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
        ]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/chat/completions", post(chat_handler))
        .route("/v1/balance", get(balance_handler))
        .route("/v1/ledger", get(ledger_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB body limit
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(
    state: SharedState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Error mapping ---

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map domain errors onto HTTP statuses. Upstream HTTP failures keep
/// their original status so clients see what the provider said.
fn error_response(err: Error) -> ApiError {
    let status = match &err {
        Error::Proxy(ProxyError::ModelNotFound(_)) => StatusCode::NOT_FOUND,
        Error::Proxy(ProxyError::ModelDisabled(_)) => StatusCode::FORBIDDEN,
        Error::Proxy(ProxyError::InsufficientCredit { .. }) => StatusCode::PAYMENT_REQUIRED,
        Error::Proxy(ProxyError::UpstreamHttp { status, .. }) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        Error::Proxy(ProxyError::UpstreamTransport(_)) => StatusCode::BAD_GATEWAY,
        Error::Ledger(LedgerError::UserNotFound(_)) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn user_id_from(headers: &HeaderMap) -> Result<i64, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: format!("missing or invalid {USER_ID_HEADER} header"),
            }),
        ))
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Catalogue entry as exposed to clients: no endpoint, no key.
#[derive(Serialize)]
struct ModelInfo {
    id: i64,
    name: String,
    model_id: String,
    provider: String,
    power_cost: i64,
    context_length: i64,
}

#[derive(Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelInfo>,
}

async fn models_handler(State(state): State<SharedState>) -> Result<Json<ModelList>, ApiError> {
    let models = state
        .models
        .list_enabled()
        .await
        .map_err(|e| error_response(e.into()))?;

    let data = models
        .into_iter()
        .map(|m| ModelInfo {
            id: m.id,
            name: m.name,
            model_id: m.model_id,
            provider: m.provider,
            power_cost: m.power_cost,
            context_length: m.context_length,
        })
        .collect();

    Ok(Json(ModelList {
        object: "list",
        data,
    }))
}

/// `POST /v1/chat/completions` — the metered chat endpoint.
///
/// Non-streaming requests return the upstream completion verbatim.
/// Streaming requests return `text/event-stream`; post-start failures
/// arrive in-band as a `{"error": ...}` event, after the refund decision
/// has already been committed.
async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    let user_id = match user_id_from(&headers) {
        Ok(id) => id,
        Err(rejection) => return rejection.into_response(),
    };

    info!(user_id, model = %request.model, stream = request.stream, "Chat request");

    match state.proxy.chat(user_id, request).await {
        Ok(ChatOutcome::Complete(value)) => Json(value).into_response(),
        Ok(ChatOutcome::Stream(rx)) => {
            let stream = ReceiverStream::new(rx).map(|line| {
                // Upstream lines carry their own "data: " framing.
                let data = line.strip_prefix("data: ").unwrap_or(&line).to_owned();
                Ok::<_, Infallible>(SseEvent::default().data(data))
            });
            Sse::new(stream).into_response()
        }
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Serialize)]
struct BalanceResponse {
    user_id: i64,
    balance: i64,
}

async fn balance_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = user_id_from(&headers)?;
    let balance = state
        .ledger
        .balance_of(user_id)
        .await
        .map_err(|e| error_response(e.into()))?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

#[derive(Serialize)]
struct LedgerResponse {
    user_id: i64,
    entries: Vec<powergate_core::ledger::LedgerEntry>,
}

async fn ledger_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<LedgerResponse>, ApiError> {
    let user_id = user_id_from(&headers)?;
    let entries = state
        .ledger
        .list_entries(user_id)
        .await
        .map_err(|e| error_response(e.into()))?;
    Ok(Json(LedgerResponse { user_id, entries }))
}

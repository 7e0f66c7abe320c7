//! HTTP server for PM33 Connect
//!
//! Exposes the connection flow to the UI: provider listing, flow initiation,
//! the provider callback route and integration management.

use crate::auth::{CallbackOutcome, CallbackParams, RedirectInstruction};
use crate::config::{Config, HttpConfig};
use crate::constants::CALLBACK_PATH_PREFIX;
use crate::model::IntegrationSummary;
use crate::providers::ProviderSummary;
use crate::service::ConnectService;
use crate::{ConnectError, Result};
use axum::{
    Router,
    extract::{Json, Path as AxumPath, Query, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    service: ConnectService,
}

/// Error type for HTTP handlers.
///
/// Only the user-facing message leaves the process; details are logged.
#[derive(Debug)]
pub struct AppError(ConnectError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }

        let body = json!({
            "error": {
                "type": self.0.code(),
                "message": self.0.user_message(),
                "status": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<ConnectError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn error_status(error: &ConnectError) -> StatusCode {
    match error {
        ConnectError::UnknownProvider(_) => StatusCode::NOT_FOUND,
        ConnectError::InvalidState
        | ConnectError::AuthorizationDenied(_)
        | ConnectError::Validation(_) => StatusCode::BAD_REQUEST,
        ConnectError::TokenExchangeFailed { .. }
        | ConnectError::NoAccessToken(_)
        | ConnectError::IdentityFetchFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status for a callback outcome, keyed by its stable error code
fn outcome_status(outcome: &CallbackOutcome) -> StatusCode {
    match outcome.error.as_deref() {
        None => StatusCode::OK,
        Some("UnknownProvider" | "InvalidState" | "AuthorizationDenied") => {
            StatusCode::BAD_REQUEST
        }
        Some("TokenExchangeFailed" | "NoAccessToken" | "IdentityFetchFailed") => {
            StatusCode::BAD_GATEWAY
        }
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let http_config = config.get_http();
    let service = ConnectService::from_config(&config).await?;

    // Abandoned flows are reclaimed for the lifetime of the server
    let _sweeper = service.spawn_sweeper();

    let app = build_router(service, &http_config);

    let addr = format!("{}:{}", http_config.host, http_config.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| ConnectError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!(
        address = %socket_addr,
        callback_base = %config.public_base_url(),
        "Starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| ConnectError::config(format!("Server error: {}", e)))?;

    Ok(())
}

/// Build the router with all endpoints
pub fn build_router(service: ConnectService, http_config: &HttpConfig) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/providers", get(list_providers_handler))
        .route(
            "/integrations/oauth/{provider}/initiate",
            post(initiate_handler),
        )
        .route(
            &format!("{}/{{provider}}", CALLBACK_PATH_PREFIX),
            get(callback_handler),
        )
        .route("/integrations", get(list_integrations_handler))
        .route("/integrations/{id}", delete(remove_integration_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new())
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors_layer(http_config)),
        )
}

/// CORS policy: configured origins, or the local UI origins
fn cors_layer(http_config: &HttpConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = match &http_config.allowed_origins {
        Some(origins) => origins.iter().filter_map(|o| o.parse().ok()).collect(),
        None => [
            format!("http://localhost:{}", http_config.port),
            format!("http://127.0.0.1:{}", http_config.port),
        ]
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect(),
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

// ============================================================================
// RESPONSE VIEWS
// ============================================================================

// Stored credentials stay server-side; responses carry summaries only.

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum InstructionView {
    Redirect {
        url: String,
        state: String,
    },
    Simulated {
        integration: IntegrationSummary,
    },
}

impl From<&RedirectInstruction> for InstructionView {
    fn from(instruction: &RedirectInstruction) -> Self {
        match instruction {
            RedirectInstruction::Redirect { url, state } => Self::Redirect {
                url: url.clone(),
                state: state.clone(),
            },
            RedirectInstruction::Simulated { integration } => Self::Simulated {
                integration: integration.into(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeView {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    integration: Option<IntegrationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl From<&CallbackOutcome> for OutcomeView {
    fn from(outcome: &CallbackOutcome) -> Self {
        Self {
            success: outcome.success,
            integration: outcome.integration.as_ref().map(IntegrationSummary::from),
            error: outcome.error.clone(),
            message: outcome.message.clone(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = crate::telemetry::get_metrics()?;
    Ok((StatusCode::OK, metrics))
}

async fn list_providers_handler(State(state): State<AppState>) -> Json<Vec<ProviderSummary>> {
    Json(state.service.providers())
}

async fn initiate_handler(
    State(state): State<AppState>,
    AxumPath(provider): AxumPath<String>,
) -> std::result::Result<Json<InstructionView>, AppError> {
    let instruction = state.service.initiate(&provider).await?;
    Ok(Json(InstructionView::from(&instruction)))
}

async fn callback_handler(
    State(state): State<AppState>,
    AxumPath(provider): AxumPath<String>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Json<OutcomeView>) {
    let outcome = state.service.handle_redirect(&provider, params).await;
    (outcome_status(&outcome), Json(OutcomeView::from(&outcome)))
}

async fn list_integrations_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<IntegrationSummary>>, AppError> {
    let integrations = state.service.list_integrations().await?;
    Ok(Json(integrations.iter().map(IntegrationSummary::from).collect()))
}

async fn remove_integration_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> std::result::Result<StatusCode, AppError> {
    state.service.remove_integration(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

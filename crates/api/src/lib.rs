pub mod config;
pub mod rate_limit;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Json, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use viaje_assistant::{
    AssistantError, DestinationEnricher, GenerationError, Generator, TripAssistant,
};
use viaje_core::{classify_prompt_value, ErrorBody, PlanRequest};
use viaje_observability::{AppMetrics, MetricsSnapshot, Outcome};
use viaje_storage::{ConsultationRepository, Store};

pub use crate::config::ApiConfig;
use crate::rate_limit::{QuotaDecision, QuotaLimiter};

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_CONSULTATION_LIMIT: usize = 10;
const MAX_CONSULTATION_LIMIT: usize = 50;
const TOP_DESTINATIONS: usize = 5;

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<TripAssistant<Store, Generator>>,
    pub metrics: Arc<AppMetrics>,
    pub limiter: QuotaLimiter,
    pub config: Arc<ApiConfig>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    storage: &'static str,
    generator: &'static str,
    generator_configured: bool,
    enrichment_enabled: bool,
    metrics: MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
    #[serde(default)]
    prompt: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ConsultationsQuery {
    limit: Option<usize>,
}

pub async fn build_app(config: ApiConfig) -> Result<Router> {
    let config = Arc::new(config);
    let metrics = AppMetrics::shared();

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };
    let generator = Generator::from_config(&config.generator)?;
    let enricher = DestinationEnricher::new(config.enrichment.clone())?;
    info!(
        storage = store.backend_name(),
        generator = generator.backend_name(),
        enrichment = enricher.is_enabled(),
        "viaje api configured"
    );

    let assistant = Arc::new(
        TripAssistant::new(Arc::new(store), Arc::new(generator), metrics.clone())
            .with_enricher(enricher),
    );

    let state = ApiState {
        assistant,
        metrics,
        limiter: QuotaLimiter::new(config.quota),
        config,
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/api/health", get(health))
        .route("/api/plan", post(plan))
        .route("/api/check", post(check))
        .route("/api/usage/:user_id", get(usage))
        .route("/api/consultations/:user_id", get(consultations))
        .route("/api/stats", get(stats))
        .layer(build_cors_layer(&state.config))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn service_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "viaje-api",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/health",
            "plan": "/api/plan (POST)",
            "check": "/api/check (POST)",
            "usage": "/api/usage/:user_id",
            "consultations": "/api/consultations/:user_id",
            "stats": "/api/stats"
        }
    }))
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let generator = state.assistant.generator();
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        storage: state.assistant.store().backend_name(),
        generator: generator.backend_name(),
        generator_configured: generator.is_configured(),
        enrichment_enabled: state.assistant.enricher().is_enabled(),
        metrics: state.metrics.snapshot(),
    };
    (StatusCode::OK, Json(payload))
}

async fn plan(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<PlanRequest>,
) -> Response {
    let key = quota_key(request.user_id.as_deref(), &headers);

    let reservation = match state.limiter.try_acquire(&key) {
        Ok(reservation) => reservation,
        Err(decision) => {
            state.metrics.record(Outcome::RateLimited);
            info!(key = %key, limit = ?decision.limit_type, "quota exhausted");
            return quota_exceeded_response(decision);
        }
    };

    match state.assistant.plan(request).await {
        Ok(response) => {
            reservation.commit();
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => assistant_error_response(err),
    }
}

async fn check(State(state): State<ApiState>, Json(request): Json<CheckRequest>) -> Response {
    let verdict = match request.prompt.as_str() {
        Some(prompt) => state.assistant.check(prompt),
        None => classify_prompt_value(&request.prompt),
    };
    (StatusCode::OK, Json(verdict)).into_response()
}

async fn usage(State(state): State<ApiState>, Path(user_id): Path<String>) -> Response {
    (StatusCode::OK, Json(state.limiter.usage(&user_id))).into_response()
}

async fn consultations(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<ConsultationsQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONSULTATION_LIMIT)
        .clamp(1, MAX_CONSULTATION_LIMIT);

    match state
        .assistant
        .store()
        .recent_consultations(&user_id, limit)
        .await
    {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(err) => storage_error_response(err),
    }
}

async fn stats(State(state): State<ApiState>) -> Response {
    match state.assistant.store().usage_summary(TOP_DESTINATIONS).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => storage_error_response(err),
    }
}

fn quota_exceeded_response(decision: QuotaDecision) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": decision.reason,
            "retryAfter": decision.retry_after_secs,
            "limitType": decision.limit_type
        })),
    )
        .into_response()
}

fn assistant_error_response(err: AssistantError) -> Response {
    let status = match &err {
        AssistantError::InvalidQuestion { .. }
        | AssistantError::InvalidTripData { .. }
        | AssistantError::UnsafePrompt { .. } => StatusCode::BAD_REQUEST,
        AssistantError::Generation(GenerationError::Unconfigured) => StatusCode::SERVICE_UNAVAILABLE,
        AssistantError::Generation(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        error!(error = %err, "answer generation failed");
    }

    (status, Json(ErrorBody::new(err.to_string()))).into_response()
}

fn storage_error_response(err: anyhow::Error) -> Response {
    error!(error = %err, "storage query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new("storage is unavailable")),
    )
        .into_response()
}

/// Body `userId` when present, else the first forwarded hop, else `local`.
fn quota_key(user_id: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(user_id) = user_id.map(str::trim).filter(|value| !value.is_empty()) {
        return user_id.to_string();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| "local".to_string())
}

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5500")]
    } else {
        origins
    };

    layer.allow_origin(AllowOrigin::list(origins))
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}

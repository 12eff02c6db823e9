use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{error::Error, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use vizgen::{
    RegistryEntry, ResolveRequest, ResolveResponse, Visualizer, VisualizerParams, VizConfig,
    VizError,
};

type BoxedError = Box<dyn Error + Send + Sync>;
type ApiError = (StatusCode, Json<Value>);

#[derive(Clone)]
struct AppState {
    visualizer: Arc<Visualizer>,
}

#[derive(Deserialize)]
struct RegistryQuery {
    q: Option<String>,
}

#[derive(Serialize)]
struct RegistryResponse {
    concepts: Vec<RegistryEntry>,
}

#[derive(Deserialize)]
struct GenerateBody {
    prompt: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    status: u16,
    html: String,
    code: String,
    kind: &'static str,
}

fn api_error(err: &VizError) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(error = %err, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "detail": err.to_string() })))
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn resolve_or_generate_handler(
    State(state): State<AppState>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, ApiError> {
    state
        .visualizer
        .resolve_or_generate(body)
        .await
        .map(Json)
        .map_err(|err| api_error(&err))
}

async fn registry_handler(
    State(state): State<AppState>,
    Query(query): Query<RegistryQuery>,
) -> Json<RegistryResponse> {
    let concepts = state.visualizer.query(query.q.as_deref()).await;
    Json(RegistryResponse { concepts })
}

async fn generate_handler(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let outcome = state
        .visualizer
        .generate_program(&body.prompt)
        .await
        .map_err(|err| api_error(&err))?;
    Ok(Json(GenerateResponse {
        status: 200,
        html: outcome.artifact.markup,
        code: outcome.source,
        kind: outcome.domain.as_str(),
    }))
}

#[tokio::main]
async fn main() -> Result<(), BoxedError> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = VizConfig::from_env()?;
    let visualizer = VisualizerParams::from_config(&config).build()?;
    let state = AppState {
        visualizer: Arc::new(visualizer),
    };

    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/resolve_or_generate", post(resolve_or_generate_handler))
        .route("/api/registry", get(registry_handler))
        .route("/api/generate", post(generate_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(config.app_url.parse::<HeaderValue>()?)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

use anyhow::Result;
use axum::{extract::{Query, State}, http::StatusCode, routing::get, Json, Router};
use esa_core::cache::CacheStats;
use esa_core::persist::ModelMeta;
use esa_core::{ConceptScore, QueryEngine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct InterpretParams {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Serialize)]
pub struct InterpretResponse {
    pub query: String,
    pub took_s: f64,
    pub concepts: Vec<ConceptScore>,
}

#[derive(Deserialize)]
pub struct SimilarityParams {
    pub a: String,
    pub b: String,
}

#[derive(Serialize)]
pub struct SimilarityResponse {
    pub similarity: f64,
    pub distance: f64,
    pub took_s: f64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub model: ModelMeta,
    pub cache: CacheStats,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub top_concepts: usize,
}

type HandlerError = (StatusCode, String);

pub fn build_app<P: AsRef<Path>>(model_dir: P, cache_chunks: usize, top_concepts: usize) -> Result<Router> {
    let engine = QueryEngine::open(model_dir, cache_chunks)?;
    Ok(router(AppState { engine: Arc::new(engine), top_concepts }))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/interpret", get(interpret_handler))
        .route("/similarity", get(similarity_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Run `f` against the engine on the blocking pool; chunk loads touch disk.
async fn with_engine<T, F>(engine: Arc<QueryEngine>, f: F) -> Result<T, HandlerError>
where
    T: Send + 'static,
    F: FnOnce(&QueryEngine) -> esa_core::Result<T> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || f(&engine)).await;
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "query failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("query task failed: {e}"))),
    }
}

pub async fn interpret_handler(
    State(state): State<AppState>,
    Query(params): Query<InterpretParams>,
) -> Result<Json<InterpretResponse>, HandlerError> {
    let start = Instant::now();
    let k = params.k.unwrap_or(state.top_concepts).clamp(1, 100);
    let text = params.q.clone();
    let concepts = with_engine(state.engine, move |engine| engine.interpret(&text, k)).await?;
    Ok(Json(InterpretResponse { query: params.q, took_s: start.elapsed().as_secs_f64(), concepts }))
}

pub async fn similarity_handler(
    State(state): State<AppState>,
    Query(params): Query<SimilarityParams>,
) -> Result<Json<SimilarityResponse>, HandlerError> {
    let start = Instant::now();
    let similarity = with_engine(state.engine, move |engine| engine.similarity(&params.a, &params.b)).await?;
    Ok(Json(SimilarityResponse { similarity, distance: 1.0 - similarity, took_s: start.elapsed().as_secs_f64() }))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse { model: state.engine.meta().clone(), cache: state.engine.cache_stats() })
}

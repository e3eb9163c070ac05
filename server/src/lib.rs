use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use bookrank::config::{IngestConfig, RankConfig};
use bookrank::ingest::{IngestReport, Ingestor};
use bookrank::provider::{ContentProvider, GutenbergClient};
use bookrank::query::{MatchMode, QueryEngine, SearchResult, TermMatcher};
use bookrank::store::{IndexStats, IndexStore};
use bookrank::BookId;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;

pub use error::ApiError;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default)]
    pub mode: MatchMode,
}

#[derive(Deserialize)]
pub struct RegexParams {
    pub regex: String,
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub book_ids: Vec<BookId>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: IndexStore,
    pub client: GutenbergClient,
    pub rank: Arc<RankConfig>,
    pub ingest: IngestConfig,
    pub admin_token: Option<String>,
    last_ingest: Arc<RwLock<Option<IngestReport>>>,
    ingest_running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(store: IndexStore, client: GutenbergClient, rank: RankConfig, ingest: IngestConfig, admin_token: Option<String>) -> Self {
        Self {
            store,
            client,
            rank: Arc::new(rank),
            ingest,
            admin_token,
            last_ingest: Arc::new(RwLock::new(None)),
            ingest_running: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
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
        .route("/books/search", get(search_handler))
        .route("/books/search/regex", get(regex_handler))
        .route("/books/:book_id", get(book_handler))
        .route("/books/:book_id/read", get(read_handler))
        .route("/books/:book_id/terms", get(terms_handler))
        .route("/index/stats", get(stats_handler))
        .route("/index/ingest", post(ingest_handler))
        .route("/index/ingest/last", get(last_ingest_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResult>, ApiError> {
    let matcher = TermMatcher::new(params.mode, &params.q)?;
    run_search(state, matcher).await
}

pub async fn regex_handler(State(state): State<AppState>, Query(params): Query<RegexParams>) -> Result<Json<SearchResult>, ApiError> {
    let matcher = TermMatcher::regex(&params.regex)?;
    run_search(state, matcher).await
}

/// Sets the flag when dropped, which happens early if the client goes away mid-search.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

async fn run_search(state: AppState, matcher: TermMatcher) -> Result<Json<SearchResult>, ApiError> {
    let start = std::time::Instant::now();
    let cancel = CancelOnDrop(Arc::new(AtomicBool::new(false)));
    let flag = Arc::clone(&cancel.0);
    let result = tokio::task::spawn_blocking(move || {
        QueryEngine::new(&state.store, &state.rank).search_with_cancel(&matcher, &flag)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    tracing::info!(books = result.books.len(), neighbors = result.neighbors.len(), took_s = start.elapsed().as_secs_f64(), "search");
    Ok(Json(result))
}

pub async fn book_handler(State(state): State<AppState>, Path(book_id): Path<BookId>) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(state.client.fetch_metadata(book_id).await?))
}

pub async fn read_handler(State(state): State<AppState>, Path(book_id): Path<BookId>) -> Result<String, ApiError> {
    Ok(state.client.fetch_content(book_id).await?)
}

pub async fn terms_handler(State(state): State<AppState>, Path(book_id): Path<BookId>) -> Result<Json<BTreeSet<String>>, ApiError> {
    Ok(Json(state.store.terms_for_book(book_id)?))
}

pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<IndexStats>, ApiError> {
    Ok(Json(state.store.stats()?))
}

/// Clears the running flag however the ingestion ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The run is detached from the request: a client that disconnects mid-ingestion does not
/// cancel it, and its report still lands in `/index/ingest/last`.
async fn ingest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ApiError> {
    authorize(&state, &headers)?;
    if state.ingest_running.swap(true, Ordering::AcqRel) {
        return Err(ApiError::Conflict("an ingestion is already running".into()));
    }
    let running = RunningGuard(Arc::clone(&state.ingest_running));

    let ingestor = Ingestor::new(state.store.clone(), Arc::new(state.client.clone()), state.ingest.clone());
    let last_ingest = Arc::clone(&state.last_ingest);
    let run = tokio::spawn(async move {
        let _running = running;
        let report = ingestor.ingest(req.book_ids).await?;
        *last_ingest.write() = Some(report.clone());
        Ok::<_, bookrank::Error>(report)
    });
    let report = run.await.map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(report))
}

async fn last_ingest_handler(State(state): State<AppState>) -> Result<Json<IngestReport>, ApiError> {
    let last = state.last_ingest.read().clone();
    last.map(Json).ok_or_else(|| ApiError::NotFound("no ingestion has run".into()))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(ApiError::Unauthorized("ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_request_cancels_its_search() {
        let store = IndexStore::temporary().unwrap();
        store.upsert("whale", 1, 5).unwrap();
        store.upsert("whale", 2, 3).unwrap();
        let rank = RankConfig::default();

        let cancel = CancelOnDrop(Arc::new(AtomicBool::new(false)));
        let flag = Arc::clone(&cancel.0);
        assert!(!flag.load(Ordering::Relaxed));
        drop(cancel);
        assert!(flag.load(Ordering::Relaxed));

        let err = QueryEngine::new(&store, &rank)
            .search_with_cancel(&TermMatcher::exact("whale").unwrap(), &flag)
            .unwrap_err();
        assert!(matches!(err, bookrank::Error::Cancelled));
        assert!(matches!(ApiError::from(err), ApiError::Internal(_)));
    }
}

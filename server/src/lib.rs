use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bookrank_core::similarity::ProgressSnapshot;
use bookrank_core::{CancellationToken, CategoryCount, DocId, Document, Error, RecomputeReport, SearchEngine};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_LIMIT: usize = 100;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Deserialize)]
pub struct KeywordParams {
    pub keyword: String,
}

#[derive(Deserialize)]
pub struct RegexParams {
    pub expression: String,
}

#[derive(Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_size")]
    pub size: usize,
}
fn default_size() -> usize { 10 }

/// A book as served to clients. The top-term bag stays internal.
#[derive(Serialize)]
pub struct BookView {
    pub id: DocId,
    pub title: String,
    pub authors: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub categories: String,
    pub download_count: u32,
    pub language: Option<String>,
    pub word_count: Option<u32>,
    pub text_url: Option<String>,
    pub centrality: f64,
}

impl From<&Document> for BookView {
    fn from(d: &Document) -> Self {
        Self {
            id: d.id,
            title: d.title.clone(),
            authors: d.authors.clone(),
            description: d.description.clone(),
            image_url: d.image_url.clone(),
            categories: d.categories.clone(),
            download_count: d.download_count,
            language: d.language.clone(),
            word_count: d.word_count,
            text_url: d.text_url.clone(),
            centrality: d.centrality,
        }
    }
}

fn views(docs: Vec<Arc<Document>>) -> Vec<BookView> {
    docs.iter().map(|d| BookView::from(d.as_ref())).collect()
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<BookView>,
}

#[derive(Serialize)]
pub struct PageResponse {
    pub items: Vec<BookView>,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

#[derive(Serialize)]
pub struct RecomputeStatus {
    pub running: bool,
    pub progress: Option<ProgressSnapshot>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub admin_token: Option<String>,
    /// Cancellation handle of the recompute started through this server, if any.
    pub recompute: Arc<Mutex<Option<CancellationToken>>>,
}

/// Build the router, reading `ADMIN_TOKEN` and `CORS_ALLOW_ORIGIN` from the environment.
pub fn build_app(engine: Arc<SearchEngine>) -> Router {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    build_app_with(engine, admin_token)
}

pub fn build_app_with(engine: Arc<SearchEngine>, admin_token: Option<String>) -> Router {
    let state = AppState { engine, admin_token, recompute: Arc::new(Mutex::new(None)) };

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
        .route("/api/books/search", get(search_handler))
        .route("/api/books/search-regex", get(search_regex_handler))
        .route("/api/books/popular", get(popular_handler))
        .route("/api/books/top-categories", get(top_categories_handler))
        .route("/api/books/category/:name", get(category_handler))
        .route("/api/books/all", get(all_handler))
        .route("/api/books/:id", get(book_handler))
        .route("/api/books/:id/suggestions", get(suggestions_handler))
        .route("/api/books/refresh", post(refresh_handler))
        .route("/api/books/recalculate-centralities", post(recompute_handler))
        .route("/api/books/recalculate-centralities/cancel", post(cancel_handler))
        .route("/api/books/recalculate-centralities/status", get(status_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn limit_or(params: &LimitParams, default: usize) -> usize {
    params.limit.unwrap_or(default).min(MAX_LIMIT)
}

fn error_response(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::InvalidPattern { .. } | Error::InvalidPagination(_) => StatusCode::BAD_REQUEST,
        Error::RecomputeInProgress | Error::Cancelled => StatusCode::CONFLICT,
        Error::UnknownDocument(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<KeywordParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let results = views(state.engine.search_by_keyword(&params.keyword));
    Json(SearchResponse { query: params.keyword, took_s: start.elapsed().as_secs_f64(), total_hits: results.len(), results })
}

pub async fn search_regex_handler(State(state): State<AppState>, Query(params): Query<RegexParams>) -> ApiResult<SearchResponse> {
    let start = std::time::Instant::now();
    let hits = state.engine.search_by_regex(&params.expression).map_err(error_response)?;
    let results = views(hits);
    Ok(Json(SearchResponse { query: params.expression, took_s: start.elapsed().as_secs_f64(), total_hits: results.len(), results }))
}

pub async fn popular_handler(State(state): State<AppState>, Query(params): Query<LimitParams>) -> Json<Vec<BookView>> {
    let limit = limit_or(&params, state.engine.config().popular_limit);
    Json(views(state.engine.top_downloaded(limit)))
}

pub async fn top_categories_handler(State(state): State<AppState>, Query(params): Query<LimitParams>) -> Json<Vec<CategoryCount>> {
    let limit = limit_or(&params, state.engine.config().categories_limit);
    Json(state.engine.top_categories(limit))
}

pub async fn category_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<LimitParams>,
) -> Json<Vec<BookView>> {
    let limit = limit_or(&params, state.engine.config().by_category_limit);
    Json(views(state.engine.by_category(&name, limit)))
}

pub async fn all_handler(State(state): State<AppState>, Query(params): Query<PageParams>) -> ApiResult<PageResponse> {
    let page = state.engine.list_by_centrality(params.page, params.size).map_err(error_response)?;
    Ok(Json(PageResponse {
        items: views(page.items),
        page: page.page_index,
        size: page.page_size,
        total_items: page.total_items,
        total_pages: page.total_pages,
    }))
}

pub async fn book_handler(State(state): State<AppState>, Path(id): Path<DocId>) -> ApiResult<BookView> {
    match state.engine.get(id) {
        Some(doc) => Ok(Json(BookView::from(doc.as_ref()))),
        None => Err((StatusCode::NOT_FOUND, format!("book {id} not found"))),
    }
}

pub async fn suggestions_handler(
    State(state): State<AppState>,
    Path(id): Path<DocId>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<BookView>> {
    let limit = limit_or(&params, state.engine.config().suggestions_limit);
    let docs = state.engine.suggestions_for(id, limit).map_err(error_response)?;
    Ok(Json(views(docs)))
}

// --- Admin endpoints ---
async fn refresh_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<serde_json::Value> {
    authorize(&state, &headers)?;
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || engine.refresh())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "documents": state.engine.snapshot().len() })))
}

struct ClearSlot(Arc<Mutex<Option<CancellationToken>>>);

impl Drop for ClearSlot {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Runs the full recompute on the blocking pool and answers once it is done.
async fn recompute_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<RecomputeReport> {
    authorize(&state, &headers)?;
    let token = {
        let mut slot = state.recompute.lock();
        if slot.is_some() {
            return Err(error_response(Error::RecomputeInProgress));
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        token
    };

    // Dropped handler futures (client gone) must still free the slot.
    let _clear = ClearSlot(Arc::clone(&state.recompute));
    let engine = Arc::clone(&state.engine);
    let joined = tokio::task::spawn_blocking(move || engine.recompute_centrality(&token)).await;

    let report = joined
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map_err(error_response)?;
    Ok(Json(report))
}

async fn cancel_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<serde_json::Value> {
    authorize(&state, &headers)?;
    let cancelled = match state.recompute.lock().as_ref() {
        Some(token) => {
            token.cancel();
            true
        }
        None => false,
    };
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

async fn status_handler(State(state): State<AppState>) -> Json<RecomputeStatus> {
    let progress = state.engine.recompute_progress();
    Json(RecomputeStatus { running: progress.is_some(), progress })
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

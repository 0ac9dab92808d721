use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::db::{Comment, Database, NewsItem, Reaction, ReactionCounts};
use crate::fetcher::Fetcher;

pub const DEFAULT_NEWS_LIMIT: i64 = 100;
pub const MAX_NEWS_LIMIT: i64 = 200;
pub const INDEX_NEWS_LIMIT: i64 = 50;
pub const MAX_COMMENT_CHARS: usize = 1000;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

pub struct AppState {
    pub db: Arc<Database>,
    pub fetcher: Arc<Fetcher>,
    pub admin_secret: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/news", get(list_news))
        .route("/news/:id", get(get_news))
        .route("/news/:id/reaction", post(add_reaction))
        .route("/news/:id/comments", get(list_comments).post(add_comment))
        .route("/likes/:id", post(like))
        .route("/dislikes/:id", post(dislike))
        .route("/update", get(update).post(update))
        .route("/update/status", get(update_status))
        .route("/feeds", get(feeds))
        .route("/health", get(health))
        .route("/healthz", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// News item as the frontend sees it
#[derive(Debug, Serialize)]
pub struct NewsView {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub image: String,
    pub source: String,
    pub category: String,
    pub language: String,
    pub likes: i64,
    pub dislikes: i64,
    pub comment_count: i64,
    pub hype_score: i64,
    pub published: Option<String>,
    pub created_at: String,
}

impl From<NewsItem> for NewsView {
    fn from(item: NewsItem) -> Self {
        let summary = if item.summary.trim().is_empty() {
            item.raw_summary
        } else {
            item.summary
        };

        Self {
            id: item.id,
            title: item.title,
            summary,
            link: item.link,
            image: item.image,
            source: item.source,
            category: item.category,
            language: item.language,
            likes: item.likes,
            dislikes: item.dislikes,
            comment_count: item.comment_count,
            hype_score: item.hype_score,
            published: item.published,
            created_at: item.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub text: String,
    pub created_at: String,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            text: comment.text,
            created_at: comment.created_at,
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub items: Vec<NewsView>,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => ApiError::Internal(err.into()).into_response(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid id")]
    InvalidId,

    #[error("Invalid action")]
    InvalidAction,

    #[error("Empty comment")]
    EmptyComment,

    #[error("Comment too long")]
    CommentTooLong,

    #[error("Admin secret required")]
    MissingSecret,

    #[error("Invalid admin secret")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed body or query string, with the extractor's status
    #[error("{detail}")]
    Rejected { status: StatusCode, detail: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidId
            | ApiError::InvalidAction
            | ApiError::EmptyComment
            | ApiError::CommentTooLong => StatusCode::BAD_REQUEST,
            ApiError::MissingSecret => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Rejected { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = match &self {
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (self.status(), Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ApiError::InvalidId)
}

// Route handlers
pub async fn index(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let items = state.db.list_news(INDEX_NEWS_LIMIT).await?;

    Ok(HtmlTemplate(IndexTemplate {
        items: items.into_iter().map(NewsView::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_NEWS_LIMIT
}

pub async fn list_news(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.clamp(1, MAX_NEWS_LIMIT);
    let items: Vec<NewsView> = state
        .db
        .list_news(limit)
        .await?
        .into_iter()
        .map(NewsView::from)
        .collect();

    Ok(Json(json!({ "items": items })))
}

pub async fn get_news(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let item = state
        .db
        .get_news(id)
        .await?
        .ok_or(ApiError::NotFound("News"))?;

    Ok(Json(json!({ "item": NewsView::from(item) })))
}

#[derive(Debug, Deserialize)]
pub struct ReactionPayload {
    #[serde(default)]
    pub action: Option<String>,
}

async fn react(
    state: &AppState,
    raw_id: &str,
    reaction: Reaction,
) -> Result<ReactionCounts, ApiError> {
    let id = parse_id(raw_id)?;
    state
        .db
        .add_reaction(id, reaction)
        .await?
        .ok_or(ApiError::NotFound("News"))
}

pub async fn add_reaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ReactionPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let reaction = payload
        .action
        .as_deref()
        .and_then(Reaction::parse)
        .ok_or(ApiError::InvalidAction)?;

    Ok(Json(react(&state, &id, reaction).await?))
}

pub async fn like(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(react(&state, &id, Reaction::Like).await?))
}

pub async fn dislike(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(react(&state, &id, Reaction::Dislike).await?))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let items: Vec<CommentView> = state
        .db
        .list_comments(id)
        .await?
        .into_iter()
        .map(CommentView::from)
        .collect();

    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct CommentPayload {
    #[serde(default)]
    pub text: Option<String>,
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<CommentPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let id = parse_id(&id)?;
    let text = payload.text.as_deref().unwrap_or_default().trim();
    if text.is_empty() {
        return Err(ApiError::EmptyComment);
    }
    if text.chars().count() > MAX_COMMENT_CHARS {
        return Err(ApiError::CommentTooLong);
    }

    let comment_id = state
        .db
        .add_comment(id, text)
        .await?
        .ok_or(ApiError::NotFound("News"))?;

    Ok((StatusCode::CREATED, Json(json!({ "id": comment_id }))))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateQuery {
    #[serde(default)]
    pub secret: Option<String>,
}

fn check_admin_secret(
    expected: Option<&str>,
    query: &UpdateQuery,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let provided = query
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| headers.get(ADMIN_SECRET_HEADER).and_then(|v| v.to_str().ok()))
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingSecret)?;

    match expected {
        Some(expected) if !expected.is_empty() && expected == provided => Ok(()),
        _ => Err(ApiError::Forbidden),
    }
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UpdateQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    check_admin_secret(state.admin_secret.as_deref(), &query, &headers)?;

    if !state.fetcher.clone().spawn_refresh().await {
        return Ok((StatusCode::OK, Json(json!({ "status": "already_running" }))));
    }

    info!("Feed refresh triggered via /update");
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))))
}

pub async fn update_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let refreshing = state.fetcher.is_refreshing().await;
    Json(json!({ "refreshing": refreshing }))
}

pub async fn feeds(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let feeds = state.db.get_all_feeds().await?;
    Ok(Json(json!({ "items": feeds })))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

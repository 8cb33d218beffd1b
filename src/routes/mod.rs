//! API Routes module for the episode stream API
//!
//! This module contains the HTTP route handlers for the public API endpoints.

use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::browser::BrowserManager;
use crate::config::Config;
use crate::constants::endpoints;
use crate::error::{AppError, AppResult};
use crate::models::{
    ApiError, ApiResponse, BrowserStatus, DebugInfo, FailureKind, IframeSummary, StreamingResult,
};
use crate::scraper::EpisodeScraper;

/// Application state shared across handlers
pub struct AppState {
    pub scraper: Arc<EpisodeScraper>,
    pub browser: Arc<BrowserManager>,
    pub config: Config,
}

/// Query parameters for the episode stream endpoint
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct EpisodeStreamQuery {
    /// Anime slug as used by the source site
    pub id: Option<String>,
    /// Episode number, a positive integer
    pub ep: Option<String>,
}

impl EpisodeStreamQuery {
    fn validate(&self) -> AppResult<(&str, u32)> {
        let id = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::validation("Query parameter 'id' is required"))?;
        let ep = self
            .ep
            .as_deref()
            .and_then(|ep| ep.trim().parse::<u32>().ok())
            .filter(|ep| *ep > 0)
            .ok_or_else(|| AppError::validation("Query parameter 'ep' must be a positive integer"))?;
        Ok((id, ep))
    }
}

/// GET /api/episode-stream - Resolve the streaming link of an episode
///
/// Query parameters: id (anime slug), ep (episode number)
#[utoipa::path(
    get,
    path = "/api/episode-stream",
    tag = "episodes",
    params(EpisodeStreamQuery),
    responses(
        (status = 200, description = "Streaming link resolved", body = StreamingResult),
        (status = 400, description = "Missing or invalid query parameters", body = ApiError),
        (status = 404, description = "No streaming iframe found on the episode page", body = StreamingResult),
        (status = 500, description = "Browser or navigation failure", body = StreamingResult)
    )
)]
pub async fn get_episode_stream(
    data: web::Data<AppState>,
    query: web::Query<EpisodeStreamQuery>,
) -> AppResult<HttpResponse> {
    let (anime_id, episode) = query.validate()?;
    let url = endpoints::episode(&data.config.base_url, anime_id, episode);
    info!("Resolving episode stream: {}", url);

    let result = data.scraper.resolve_episode(&url).await;

    let response = match result.failure {
        None => HttpResponse::Ok().json(result),
        Some(FailureKind::NotFound) => HttpResponse::NotFound().json(result),
        Some(FailureKind::Unexpected) => HttpResponse::InternalServerError().json(result),
    };
    Ok(response)
}

/// GET /health/browser - Shared browser status
#[utoipa::path(
    get,
    path = "/health/browser",
    tag = "health",
    responses(
        (status = 200, description = "Shared browser status", body = ApiResponse<BrowserStatus>)
    )
)]
pub async fn browser_health(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::new(BrowserStatus {
        running: data.browser.is_running(),
        open_pages: data.browser.open_pages(),
    }))
}

/// Fallback for unknown paths, answered with the JSON error body
pub async fn route_not_found(request: HttpRequest) -> AppResult<HttpResponse> {
    Err(AppError::not_found(format!("No route for {}", request.path())))
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Anime Episode Stream API",
        version = "0.1.0",
        description = "Resolves anime episode pages to their video host streaming links",
        license(
            name = "MIT"
        )
    ),
    paths(
        get_episode_stream,
        browser_health
    ),
    components(
        schemas(
            StreamingResult,
            DebugInfo,
            IframeSummary,
            BrowserStatus,
            ApiError,
            EpisodeStreamQuery
        )
    ),
    tags(
        (name = "episodes", description = "Episode stream resolution"),
        (name = "health", description = "Service status")
    )
)]
pub struct ApiDoc;

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health/browser", web::get().to(browser_health))
        .service(web::scope("/api").route("/episode-stream", web::get().to(get_episode_stream)));
}

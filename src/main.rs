//! Anime Episode Stream API Server
//!
//! Main entry point for the episode stream REST API service.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use anime_episode_scraper::browser::{BrowserManager, ChromeLauncher};
use anime_episode_scraper::cache::ResultCache;
use anime_episode_scraper::config::Config;
use anime_episode_scraper::routes::{configure_routes, route_not_found, ApiDoc, AppState};
use anime_episode_scraper::scraper::EpisodeScraper;

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let bind_address = format!("{}:{}", config.host, config.port);

    let launcher = Arc::new(ChromeLauncher::new(config.browser.clone()));
    let browser = Arc::new(BrowserManager::new(launcher, config.browser.max_concurrent_pages));
    browser.spawn_shutdown_hook();
    let scraper = EpisodeScraper::new(
        Arc::clone(&browser),
        Arc::new(ResultCache::new()),
        config.scraper.clone(),
    )
    .with_cache_ttl(Duration::from_millis(config.cache_ttl_ms));

    let app_state = web::Data::new(AppState {
        scraper: Arc::new(scraper),
        browser: Arc::clone(&browser),
        config: config.clone(),
    });

    info!("Starting Anime Episode Stream API server on {}", bind_address);

    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .route("/health", web::get().to(health_check))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
            .configure(configure_routes)
            .default_service(web::route().to(route_not_found))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    browser.shutdown().await;
    info!("Server stopped");
    Ok(())
}

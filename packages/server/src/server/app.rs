//! Application setup and server configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domains::discovery::{DiscoveryService, IngestionPipeline};
use crate::domains::pantry::store::{BasePantryStore, PostgresPantryStore};
use crate::kernel::traits::{BaseExtractor, BasePlaceSearch, BaseSearchCache, BaseWebScraper};
use crate::kernel::{OpenAiExtractor, PlacesClient, PostgresSearchCache, SiteScraper};
use crate::server::routes::{
    discovery_status_handler, discovery_stream_handler, health_handler, ingest_pantry_handler,
    list_pantries_handler, nearby_pantries_handler, start_discovery_handler,
};

/// Shared application state. All services are constructed once at startup
/// and injected here; handlers never build their own clients.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub discovery: Arc<DiscoveryService>,
    pub pantry_store: Arc<dyn BasePantryStore>,
}

/// Build the Axum application router with all dependencies wired.
pub fn build_app(pool: PgPool, config: &Config) -> Result<Router> {
    let cache: Arc<dyn BaseSearchCache> = Arc::new(PostgresSearchCache::new(
        pool.clone(),
        config.places_cache_ttl_days,
    ));
    let places: Arc<dyn BasePlaceSearch> = Arc::new(PlacesClient::new(
        config.google_places_api_key.clone(),
        cache,
    ));
    let scraper: Arc<dyn BaseWebScraper> =
        Arc::new(SiteScraper::new().context("Failed to build scraper")?);
    let extractor: Arc<dyn BaseExtractor> =
        Arc::new(OpenAiExtractor::new(config.openai_api_key.clone()));
    let pantry_store: Arc<dyn BasePantryStore> = Arc::new(PostgresPantryStore::new(pool.clone()));

    let pipeline = IngestionPipeline::new(scraper, extractor);
    let discovery = Arc::new(DiscoveryService::new(places, pantry_store.clone(), pipeline));

    let state = AppState {
        db_pool: pool,
        discovery,
        pantry_store,
    };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    // Discovery starts are the expensive operation (scraper + LLM fan-out
    // behind each one): 10 per minute per client IP.
    let rate_limit_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(6)
            .burst_size(10)
            .use_headers()
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    let discover_start = Router::new()
        .route("/pantries/discover", post(start_discovery_handler))
        .layer(GovernorLayer {
            config: rate_limit_config,
        });

    let app = Router::new()
        .merge(discover_start)
        .route(
            "/pantries/discover/status/:job_id",
            get(discovery_status_handler),
        )
        .route(
            "/pantries/discover/stream/:job_id",
            get(discovery_stream_handler),
        )
        .route("/pantries", get(list_pantries_handler))
        .route("/pantries/nearby", get(nearby_pantries_handler))
        .route("/pantries/:id/ingest", post(ingest_pantry_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

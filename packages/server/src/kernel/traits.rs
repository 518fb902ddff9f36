// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The discovery orchestrator and ingestion pipeline depend on these ports,
// never on the concrete clients, so tests can substitute mocks.
//
// Naming convention: Base* for trait names (e.g., BaseWebScraper)

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::domains::discovery::models::PlaceCandidate;
use crate::kernel::places_client::PlacesApiError;

// =============================================================================
// Web Scraper Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseWebScraper: Send + Sync {
    /// Scrape a URL and return its main content as Markdown.
    ///
    /// Returns `Ok(None)` when the page was reachable but yielded no usable
    /// content; `Err` carries transport/HTTP failures.
    async fn scrape(&self, url: &str) -> Result<Option<String>>;
}

// =============================================================================
// Extractor Trait (Infrastructure - LLM structured output)
// =============================================================================

#[async_trait]
pub trait BaseExtractor: Send + Sync {
    /// Extract raw structured pantry fields from Markdown.
    ///
    /// The payload is deliberately dict-shaped (`serde_json::Value`): the
    /// validation gate inspects field types before anything is trusted.
    /// Returns `Ok(None)` when the model produced nothing usable.
    async fn extract(&self, markdown: &str) -> Result<Option<Value>>;
}

// =============================================================================
// Place Search Trait (Infrastructure - Google Places)
// =============================================================================

#[async_trait]
pub trait BasePlaceSearch: Send + Sync {
    /// Search a geographic circle for food-assistance candidates,
    /// deduplicated by place id.
    async fn search_area(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, PlacesApiError>;

    /// Place Details fallback for a missing website URL.
    /// Lookup failures are non-fatal and collapse to `None`.
    async fn place_website(&self, place_id: &str) -> Option<String>;
}

// =============================================================================
// Search Cache Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseSearchCache: Send + Sync {
    /// Look up cached search results for an area bucket. Expired or missing
    /// entries return `None`; read failures are non-fatal.
    async fn get(&self, key: &str) -> Option<Vec<PlaceCandidate>>;

    /// Store search results for an area bucket. Write failures are logged
    /// and swallowed - caching is best-effort.
    async fn put(
        &self,
        key: &str,
        lat: f64,
        lng: f64,
        radius_meters: u32,
        results: &[PlaceCandidate],
    );
}

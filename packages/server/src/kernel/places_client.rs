//! Google Places API (New) client for discovering food pantry candidates.
//!
//! Uses Text Search with an Enterprise field mask to get websiteUri,
//! displayName, formattedAddress, and location in a single call. Runs a
//! small sweep of food-related queries deduplicated by place id, falls back
//! to Place Details for missing websites, and caches results per area
//! bucket through [`BaseSearchCache`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domains::discovery::models::PlaceCandidate;
use crate::kernel::traits::{BasePlaceSearch, BaseSearchCache};

const TEXT_SEARCH_URL: &str = "https://places.googleapis.com/v1/places:searchText";
const PLACE_DETAILS_URL: &str = "https://places.googleapis.com/v1/places";

// Enterprise field mask - includes websiteUri (bumps to Enterprise tier,
// but the free request quota covers our usage).
const FIELD_MASK: &str =
    "places.displayName,places.formattedAddress,places.location,places.websiteUri,places.id";

const DETAIL_FIELD_MASK: &str = "websiteUri";

/// Search queries for maximum coverage
const DISCOVERY_QUERIES: [&str; 4] = [
    "food bank",
    "food pantry",
    "food distribution",
    "community food",
];

/// Cap on candidates returned per search, and per underlying text query.
const MAX_RESULTS: usize = 10;

/// Raised when the Google Places API call fails.
#[derive(Debug, Clone, Error)]
#[error("Places API error ({status_code}): {message}")]
pub struct PlacesApiError {
    pub status_code: u16,
    pub message: String,
}

impl PlacesApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

/// Wrapper around Google Places API (New) for food pantry discovery.
pub struct PlacesClient {
    client: reqwest::Client,
    api_key: String,
    cache: Arc<dyn BaseSearchCache>,
}

impl PlacesClient {
    pub fn new(api_key: impl Into<String>, cache: Arc<dyn BaseSearchCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            cache,
        }
    }

    /// Run a single Text Search query.
    async fn text_search(
        &self,
        query: &str,
        lat: f64,
        lng: f64,
        radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, PlacesApiError> {
        let body = serde_json::json!({
            "textQuery": query,
            "locationBias": {
                "circle": {
                    "center": { "latitude": lat, "longitude": lng },
                    "radius": radius_meters as f64,
                }
            },
            "maxResultCount": MAX_RESULTS,
        });

        let response = self
            .client
            .post(TEXT_SEARCH_URL)
            .header("Content-Type", "application/json")
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlacesApiError::new(0, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let mut detail = response.text().await.unwrap_or_default();
            detail.truncate(500);
            error!(
                query = %query,
                status_code = status.as_u16(),
                error = %detail,
                "Places text search failed"
            );
            return Err(PlacesApiError::new(status.as_u16(), detail));
        }

        let payload: TextSearchResponse = response
            .json()
            .await
            .map_err(|e| PlacesApiError::new(0, e.to_string()))?;

        let results = payload
            .places
            .into_iter()
            .map(PlaceCandidate::from)
            .take(MAX_RESULTS)
            .collect();

        Ok(results)
    }
}

#[async_trait]
impl BasePlaceSearch for PlacesClient {
    /// Search for food organizations using multiple queries, deduped by
    /// place id. Checks the area cache first. A single query failing is
    /// tolerated; the search as a whole fails only when every query fails.
    async fn search_area(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, PlacesApiError> {
        let start = Instant::now();

        let cache_key = make_cache_key(lat, lng, radius_meters);
        if let Some(cached) = self.cache.get(&cache_key).await {
            info!(
                lat,
                lng,
                results_count = cached.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Places search cache hit"
            );
            return Ok(cached.into_iter().take(MAX_RESULTS).collect());
        }

        let mut seen_ids = std::collections::HashSet::new();
        let mut all_results: Vec<PlaceCandidate> = Vec::new();
        let mut last_error: Option<PlacesApiError> = None;

        for query in DISCOVERY_QUERIES {
            match self.text_search(query, lat, lng, radius_meters).await {
                Ok(results) => {
                    for r in results {
                        if !r.place_id.is_empty() && seen_ids.insert(r.place_id.clone()) {
                            all_results.push(r);
                        }
                    }
                }
                // Logged in text_search; continue with the other queries
                Err(e) => last_error = Some(e),
            }
        }

        // Every query failed: surface the provider failure to the caller
        if all_results.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let with_website = all_results.iter().filter(|r| r.website_url.is_some()).count();
        info!(
            lat,
            lng,
            total_results = all_results.len(),
            with_website,
            without_website = all_results.len() - with_website,
            duration_ms = start.elapsed().as_millis() as u64,
            "Multi-query places search complete"
        );

        self.cache
            .put(&cache_key, lat, lng, radius_meters, &all_results)
            .await;

        all_results.truncate(MAX_RESULTS);
        Ok(all_results)
    }

    /// Fetch a website URL for a place via the Place Details API.
    /// Used as fallback when Text Search doesn't return a websiteUri.
    async fn place_website(&self, place_id: &str) -> Option<String> {
        let url = format!("{}/{}", PLACE_DETAILS_URL, place_id);

        let response = self
            .client
            .get(&url)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", DETAIL_FIELD_MASK)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(place_id = %place_id, error = %e, "Place Details lookup failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                place_id = %place_id,
                status_code = response.status().as_u16(),
                "Place Details lookup failed"
            );
            return None;
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Details {
            website_uri: Option<String>,
        }

        response.json::<Details>().await.ok()?.website_uri
    }
}

/// Create a cache key from rounded coordinates + radius.
///
/// Coordinates round to 2 decimal places (~1.1km) and the radius to the
/// next kilometer, so nearby searches share a bucket.
pub fn make_cache_key(lat: f64, lng: f64, radius_meters: u32) -> String {
    let bucketed_radius = radius_meters.div_ceil(1000) * 1000;
    format!("{:.2},{:.2},{}", lat, lng, bucketed_radius)
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    places: Vec<Place>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Place {
    #[serde(default)]
    display_name: Option<DisplayName>,
    #[serde(default)]
    formatted_address: Option<String>,
    #[serde(default)]
    location: Option<LatLng>,
    #[serde(default)]
    website_uri: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisplayName {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

impl From<Place> for PlaceCandidate {
    fn from(place: Place) -> Self {
        let location = place.location.unwrap_or(LatLng {
            latitude: 0.0,
            longitude: 0.0,
        });
        Self {
            name: place
                .display_name
                .and_then(|d| d.text)
                .unwrap_or_else(|| "Unknown".to_string()),
            address: place.formatted_address.unwrap_or_default(),
            lat: location.latitude,
            lng: location.longitude,
            website_url: place.website_uri,
            place_id: place.id.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_rounds_coordinates() {
        assert_eq!(make_cache_key(39.7392, -104.9903, 8000), "39.74,-104.99,8000");
    }

    #[test]
    fn cache_key_buckets_radius_to_next_km() {
        assert_eq!(make_cache_key(0.0, 0.0, 8500), "0.00,0.00,9000");
        assert_eq!(make_cache_key(0.0, 0.0, 8000), "0.00,0.00,8000");
    }

    #[test]
    fn nearby_searches_share_a_bucket() {
        let a = make_cache_key(39.7392, -104.9903, 8000);
        let b = make_cache_key(39.7401, -104.9898, 8000);
        assert_eq!(a, b);
    }

    #[test]
    fn text_search_response_parses() {
        let raw = serde_json::json!({
            "places": [{
                "displayName": { "text": "Denver Food Bank" },
                "formattedAddress": "123 Main St, Denver, CO 80202, USA",
                "location": { "latitude": 39.7392, "longitude": -104.9903 },
                "websiteUri": "https://denverfoodbank.org",
                "id": "place_abc",
            }]
        });

        let parsed: TextSearchResponse = serde_json::from_value(raw).unwrap();
        let candidate = PlaceCandidate::from(parsed.places.into_iter().next().unwrap());

        assert_eq!(candidate.name, "Denver Food Bank");
        assert_eq!(candidate.place_id, "place_abc");
        assert_eq!(candidate.website_url.as_deref(), Some("https://denverfoodbank.org"));
        assert!((candidate.lat - 39.7392).abs() < 1e-9);
    }

    #[test]
    fn text_search_response_tolerates_missing_fields() {
        let parsed: TextSearchResponse = serde_json::from_value(serde_json::json!({
            "places": [{}]
        }))
        .unwrap();
        let candidate = PlaceCandidate::from(parsed.places.into_iter().next().unwrap());

        assert_eq!(candidate.name, "Unknown");
        assert!(candidate.website_url.is_none());
        assert!(candidate.place_id.is_empty());
    }

    #[test]
    fn empty_response_parses() {
        let parsed: TextSearchResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(parsed.places.is_empty());
    }
}

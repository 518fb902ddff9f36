//! Mock implementations of the kernel ports for testing.
//!
//! Each mock allows configuring canned responses per URL / place id and
//! records calls for verification.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domains::discovery::models::PlaceCandidate;
use crate::kernel::places_client::PlacesApiError;
use crate::kernel::traits::{BaseExtractor, BasePlaceSearch, BaseWebScraper};

/// Mock place search with canned results or a forced provider error.
#[derive(Default)]
pub struct MockPlaceSearch {
    results: RwLock<Vec<PlaceCandidate>>,
    error: RwLock<Option<PlacesApiError>>,
    websites: RwLock<HashMap<String, String>>,
    search_calls: RwLock<u32>,
}

impl MockPlaceSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, results: Vec<PlaceCandidate>) -> Self {
        *self.results.write().unwrap() = results;
        self
    }

    pub fn with_error(self, status_code: u16, message: &str) -> Self {
        *self.error.write().unwrap() = Some(PlacesApiError::new(status_code, message));
        self
    }

    /// Configure a Place Details website for a place id.
    pub fn with_website(self, place_id: &str, url: &str) -> Self {
        self.websites
            .write()
            .unwrap()
            .insert(place_id.to_string(), url.to_string());
        self
    }

    pub fn search_call_count(&self) -> u32 {
        *self.search_calls.read().unwrap()
    }
}

#[async_trait]
impl BasePlaceSearch for MockPlaceSearch {
    async fn search_area(
        &self,
        _lat: f64,
        _lng: f64,
        _radius_meters: u32,
    ) -> Result<Vec<PlaceCandidate>, PlacesApiError> {
        *self.search_calls.write().unwrap() += 1;

        if let Some(error) = self.error.read().unwrap().clone() {
            return Err(error);
        }
        Ok(self.results.read().unwrap().clone())
    }

    async fn place_website(&self, place_id: &str) -> Option<String> {
        self.websites.read().unwrap().get(place_id).cloned()
    }
}

/// Mock scraper with per-URL pages, failures, and optional delays.
#[derive(Default)]
pub struct MockScraper {
    pages: RwLock<HashMap<String, String>>,
    failures: RwLock<HashMap<String, String>>,
    delays: RwLock<HashMap<String, Duration>>,
    scrape_calls: RwLock<Vec<String>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, markdown: &str) -> Self {
        self.pages
            .write()
            .unwrap()
            .insert(url.to_string(), markdown.to_string());
        self
    }

    /// Scraping this URL fails with the given reason.
    pub fn with_failure(self, url: &str, reason: &str) -> Self {
        self.failures
            .write()
            .unwrap()
            .insert(url.to_string(), reason.to_string());
        self
    }

    /// Scraping this URL sleeps first (for timeout tests).
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.write().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn scrape_calls(&self) -> Vec<String> {
        self.scrape_calls.read().unwrap().clone()
    }
}

#[async_trait]
impl BaseWebScraper for MockScraper {
    async fn scrape(&self, url: &str) -> anyhow::Result<Option<String>> {
        self.scrape_calls.write().unwrap().push(url.to_string());

        let delay = self.delays.read().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.failures.read().unwrap().get(url) {
            anyhow::bail!("{}", reason);
        }

        Ok(self.pages.read().unwrap().get(url).cloned())
    }
}

/// Mock extractor returning one canned payload for every input.
#[derive(Default)]
pub struct MockExtractor {
    response: RwLock<Option<Value>>,
    fail_reason: RwLock<Option<String>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: Value) -> Self {
        *self.response.write().unwrap() = Some(response);
        self
    }

    pub fn with_failure(self, reason: &str) -> Self {
        *self.fail_reason.write().unwrap() = Some(reason.to_string());
        self
    }

    /// A well-formed extraction payload, overridable per test.
    pub fn valid_payload() -> Value {
        serde_json::json!({
            "status": "OPEN",
            "hours_notes": "Mon-Fri 9am-5pm",
            "hours_today": "9am-5pm",
            "eligibility_rules": ["Open to all"],
            "is_id_required": false,
            "confidence": 8,
        })
    }
}

#[async_trait]
impl BaseExtractor for MockExtractor {
    async fn extract(&self, _markdown: &str) -> anyhow::Result<Option<Value>> {
        if let Some(reason) = self.fail_reason.read().unwrap().clone() {
            anyhow::bail!("{}", reason);
        }
        Ok(self.response.read().unwrap().clone())
    }
}

/// A search hit with sensible defaults for tests.
pub fn test_candidate(name: &str, website_url: Option<&str>) -> PlaceCandidate {
    PlaceCandidate {
        name: name.to_string(),
        address: "123 Main St, Denver, CO 80202, USA".to_string(),
        lat: 39.7392,
        lng: -104.9903,
        website_url: website_url.map(str::to_string),
        place_id: format!("place_{}", name.to_lowercase().replace(' ', "_")),
    }
}

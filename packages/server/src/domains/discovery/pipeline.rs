//! Ingestion pipeline - the full scrape -> extract -> validate flow.
//!
//! Single entry point for both live discovery and manual re-ingestion.
//! Each stage logs structured events so failures are traceable end-to-end.
//! The pipeline makes exactly one attempt; retry policy belongs to callers.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::validator::validate_extraction;
use crate::domains::pantry::models::PantryUpdate;
use crate::kernel::traits::{BaseExtractor, BaseWebScraper};

/// The pipeline stage a failure occurred in. `Unknown` marks errors caught
/// outside the three stages (e.g. a store write during fan-out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scrape,
    Extract,
    Validate,
    Unknown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scrape => "scrape",
            Self::Extract => "extract",
            Self::Validate => "validate",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Raised when the ingestion pipeline fails at any stage.
#[derive(Debug, Clone, Error)]
#[error("Ingestion failed at '{stage}' for {url}: {reason}")]
pub struct IngestionError {
    pub stage: Stage,
    pub reason: String,
    pub url: String,
}

impl IngestionError {
    pub fn new(stage: Stage, reason: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
            url: url.into(),
        }
    }
}

/// Orchestrates: scrape -> extract -> validate.
///
/// Each stage is independently testable; this wires them together with
/// structured logging and a uniform typed failure.
#[derive(Clone)]
pub struct IngestionPipeline {
    scraper: Arc<dyn BaseWebScraper>,
    extractor: Arc<dyn BaseExtractor>,
}

impl IngestionPipeline {
    pub fn new(scraper: Arc<dyn BaseWebScraper>, extractor: Arc<dyn BaseExtractor>) -> Self {
        Self { scraper, extractor }
    }

    /// Run the full ingestion pipeline for a single URL.
    pub async fn ingest(&self, url: &str) -> Result<PantryUpdate, IngestionError> {
        let start = Instant::now();
        info!(url = %url, "Ingestion started");

        // 1. Scrape
        let markdown = self
            .scraper
            .scrape(url)
            .await
            .map_err(|e| IngestionError::new(Stage::Scrape, e.to_string(), url))?
            .ok_or_else(|| {
                IngestionError::new(Stage::Scrape, "Scraper returned no content", url)
            })?;

        // 2. Extract
        let data = self
            .extractor
            .extract(&markdown)
            .await
            .map_err(|e| IngestionError::new(Stage::Extract, e.to_string(), url))?
            .ok_or_else(|| {
                IngestionError::new(Stage::Extract, "Extractor returned no data", url)
            })?;

        // 3. Validate, then apply documented defaults
        validate_extraction(&data).map_err(|e| {
            IngestionError::new(
                Stage::Validate,
                format!("Validation failed on '{}': {}", e.field, e.reason),
                url,
            )
        })?;
        let update = PantryUpdate::from_raw(&data);

        info!(
            url = %url,
            confidence = update.confidence,
            status = update.status.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Ingestion complete"
        );

        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::pantry::models::PantryStatus;
    use crate::kernel::testing::{MockExtractor, MockScraper};

    const URL: &str = "https://pantry.org";

    fn pipeline(scraper: MockScraper, extractor: MockExtractor) -> IngestionPipeline {
        IngestionPipeline::new(Arc::new(scraper), Arc::new(extractor))
    }

    #[tokio::test]
    async fn happy_path_returns_update() {
        let pipeline = pipeline(
            MockScraper::new().with_page(URL, "# Pantry\nOpen Mon-Fri"),
            MockExtractor::new().with_response(MockExtractor::valid_payload()),
        );

        let update = pipeline.ingest(URL).await.unwrap();
        assert_eq!(update.status, PantryStatus::Open);
        assert_eq!(update.confidence, 8);
        assert_eq!(update.hours_notes, "Mon-Fri 9am-5pm");
    }

    #[tokio::test]
    async fn empty_scrape_is_scrape_failure() {
        // No page configured: scraper yields None
        let pipeline = pipeline(
            MockScraper::new(),
            MockExtractor::new().with_response(MockExtractor::valid_payload()),
        );

        let err = pipeline.ingest(URL).await.unwrap_err();
        assert_eq!(err.stage, Stage::Scrape);
        assert_eq!(err.reason, "Scraper returned no content");
        assert_eq!(err.url, URL);
    }

    #[tokio::test]
    async fn scraper_error_carries_reason() {
        let pipeline = pipeline(
            MockScraper::new().with_failure(URL, "Timeout"),
            MockExtractor::new(),
        );

        let err = pipeline.ingest(URL).await.unwrap_err();
        assert_eq!(err.stage, Stage::Scrape);
        assert_eq!(err.reason, "Timeout");
    }

    #[tokio::test]
    async fn empty_extraction_is_extract_failure() {
        let pipeline = pipeline(
            MockScraper::new().with_page(URL, "# Pantry"),
            MockExtractor::new(), // returns None
        );

        let err = pipeline.ingest(URL).await.unwrap_err();
        assert_eq!(err.stage, Stage::Extract);
        assert_eq!(err.reason, "Extractor returned no data");
    }

    #[tokio::test]
    async fn invalid_extraction_is_validate_failure() {
        let mut payload = MockExtractor::valid_payload();
        payload["confidence"] = serde_json::json!(42);

        let pipeline = pipeline(
            MockScraper::new().with_page(URL, "# Pantry"),
            MockExtractor::new().with_response(payload),
        );

        let err = pipeline.ingest(URL).await.unwrap_err();
        assert_eq!(err.stage, Stage::Validate);
        assert!(err.reason.contains("confidence"));
    }

    #[tokio::test]
    async fn defaults_applied_after_validation() {
        let payload = serde_json::json!({
            "status": "OPEN",
            "confidence": 6,
        });

        let pipeline = pipeline(
            MockScraper::new().with_page(URL, "# Pantry"),
            MockExtractor::new().with_response(payload),
        );

        let update = pipeline.ingest(URL).await.unwrap();
        assert_eq!(update.hours_today, "Not listed");
        assert_eq!(
            update.eligibility_rules,
            vec!["Open to all - no restrictions listed".to_string()]
        );
        assert_eq!(update.is_id_required, Some(false));
    }

    #[test]
    fn stage_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Stage::Scrape).unwrap(), "\"scrape\"");
        assert_eq!(serde_json::to_string(&Stage::Unknown).unwrap(), "\"unknown\"");
    }
}

//! Kernel module - infrastructure clients and dependency-injection ports.

pub mod extractor;
pub mod places_client;
pub mod scraper;
pub mod search_cache;
pub mod testing;
pub mod traits;

/// Model used for structured pantry extraction.
pub const EXTRACTION_MODEL: &str = "gpt-4o-mini";

pub use extractor::OpenAiExtractor;
pub use places_client::{PlacesApiError, PlacesClient};
pub use scraper::SiteScraper;
pub use search_cache::{MemorySearchCache, PostgresSearchCache};
pub use traits::{BaseExtractor, BasePlaceSearch, BaseSearchCache, BaseWebScraper};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub google_places_api_key: String,
    pub openai_api_key: String,
    pub places_cache_ttl_days: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            google_places_api_key: env::var("GOOGLE_PLACES_API_KEY")
                .context("GOOGLE_PLACES_API_KEY must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?,
            places_cache_ttl_days: env::var("DISCOVERY_CACHE_TTL_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("DISCOVERY_CACHE_TTL_DAYS must be a valid number")?,
        })
    }
}

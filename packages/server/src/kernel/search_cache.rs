//! Area-bucketed caching of place search results.
//!
//! Search results are cached per rounded (lat, lng, radius) bucket so
//! repeated discovery over the same neighborhood doesn't re-bill the
//! places API. Cache failures are never fatal - a broken cache degrades
//! to a live search.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::warn;

use crate::domains::discovery::models::PlaceCandidate;
use crate::kernel::traits::BaseSearchCache;

/// Postgres-backed cache (table `discovery_cache`).
pub struct PostgresSearchCache {
    pool: PgPool,
    ttl: Duration,
}

impl PostgresSearchCache {
    pub fn new(pool: PgPool, ttl_days: i64) -> Self {
        Self {
            pool,
            ttl: Duration::days(ttl_days),
        }
    }
}

#[async_trait]
impl BaseSearchCache for PostgresSearchCache {
    async fn get(&self, key: &str) -> Option<Vec<PlaceCandidate>> {
        let row: Option<(serde_json::Value, DateTime<Utc>)> = sqlx::query_as(
            "SELECT results, created_at FROM discovery_cache WHERE cache_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| warn!(error = %e, "Search cache read failed"))
        .ok()?;

        let (results, created_at) = row?;
        if created_at < Utc::now() - self.ttl {
            return None;
        }

        serde_json::from_value(results)
            .map_err(|e| warn!(error = %e, "Search cache entry is malformed"))
            .ok()
    }

    async fn put(
        &self,
        key: &str,
        lat: f64,
        lng: f64,
        radius_meters: u32,
        results: &[PlaceCandidate],
    ) {
        let payload = match serde_json::to_value(results) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to serialize search cache entry");
                return;
            }
        };

        let outcome = sqlx::query(
            "INSERT INTO discovery_cache (cache_key, lat, lng, radius_meters, results, created_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             ON CONFLICT (cache_key) DO UPDATE
                SET lat = EXCLUDED.lat,
                    lng = EXCLUDED.lng,
                    radius_meters = EXCLUDED.radius_meters,
                    results = EXCLUDED.results,
                    created_at = NOW()",
        )
        .bind(key)
        .bind(lat)
        .bind(lng)
        .bind(radius_meters as i32)
        .bind(payload)
        .execute(&self.pool)
        .await;

        if let Err(e) = outcome {
            warn!(error = %e, "Failed to cache places results");
        }
    }
}

/// In-memory cache for tests and single-process development.
#[derive(Default)]
pub struct MemorySearchCache {
    entries: RwLock<HashMap<String, (DateTime<Utc>, Vec<PlaceCandidate>)>>,
    ttl: Option<Duration>,
}

impl MemorySearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BaseSearchCache for MemorySearchCache {
    async fn get(&self, key: &str) -> Option<Vec<PlaceCandidate>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let (created_at, results) = entries.get(key)?;

        if let Some(ttl) = self.ttl {
            if *created_at < Utc::now() - ttl {
                return None;
            }
        }

        Some(results.clone())
    }

    async fn put(
        &self,
        key: &str,
        _lat: f64,
        _lng: f64,
        _radius_meters: u32,
        results: &[PlaceCandidate],
    ) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), (Utc::now(), results.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str) -> PlaceCandidate {
        PlaceCandidate {
            name: name.to_string(),
            address: "123 Main St, Denver, CO 80202, USA".to_string(),
            lat: 39.7392,
            lng: -104.9903,
            website_url: None,
            place_id: format!("place_{name}"),
        }
    }

    #[tokio::test]
    async fn memory_cache_roundtrip() {
        let cache = MemorySearchCache::new();
        cache.put("39.74,-104.99,8000", 39.74, -104.99, 8000, &[candidate("a")]).await;

        let hit = cache.get("39.74,-104.99,8000").await.unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].name, "a");
    }

    #[tokio::test]
    async fn memory_cache_miss() {
        let cache = MemorySearchCache::new();
        assert!(cache.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn memory_cache_expires() {
        let cache = MemorySearchCache::with_ttl(Duration::seconds(-1));
        cache.put("k", 0.0, 0.0, 1000, &[candidate("a")]).await;
        assert!(cache.get("k").await.is_none());
    }
}

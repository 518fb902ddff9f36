//! Pantry record store - identity, freshness, and proximity lookups.
//!
//! The store is the dedup procedure's source of truth: records are keyed
//! by source URL when present (unique, sparse) and fall back to
//! name + proximity matching otherwise. All timestamps are TIMESTAMPTZ and
//! surface as UTC; a store that dropped timezone offsets would still
//! compare correctly because everything is normalized to UTC on the way in.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{NewPantry, Pantry, PantryUpdate};
use crate::common::geo::haversine_meters;

/// Persistence port for pantry records.
#[async_trait]
pub trait BasePantryStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pantry>>;

    async fn list_all(&self, limit: i64) -> Result<Vec<Pantry>>;

    /// Records within `radius_meters` of a point, nearest first.
    async fn find_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<Pantry>>;

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Pantry>>;

    /// A record with a case-insensitive exact name match within
    /// `radius_meters`, updated at or after `cutoff`.
    async fn find_fresh_by_name_near(
        &self,
        name: &str,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Pantry>>;

    async fn count_fresh_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<i64>;

    /// Upsert keyed by source URL. The payload must carry a URL.
    async fn upsert_by_source_url(&self, pantry: NewPantry) -> Result<Pantry>;

    /// Upsert for records that may lack a URL: URL upsert when present,
    /// otherwise replace a name + proximity (200m) match, otherwise insert.
    async fn upsert_basic(&self, pantry: NewPantry) -> Result<Pantry>;

    /// Merge freshly-ingested content fields into an existing record.
    async fn update_from_ingestion(
        &self,
        id: Uuid,
        update: &PantryUpdate,
        source_url: &str,
    ) -> Result<Pantry>;
}

/// Proximity radius for the no-URL upsert match.
const BASIC_UPSERT_RADIUS_M: f64 = 200.0;

const INSERT_COLUMNS: &str = "id, name, address, lat, lng, city, state, status, hours_notes, \
     hours_today, eligibility_rules, is_id_required, residency_req, special_notes, confidence, \
     source_url, discovered_via, google_places_only, last_updated";

/// Great-circle distance in SQL, parameterized by bind positions for the
/// query point. 12742000 = 2 * mean Earth radius in meters.
fn distance_sql(lat_bind: usize, lng_bind: usize) -> String {
    format!(
        "12742000.0 * asin(sqrt(power(sin(radians(${lat} - lat) / 2), 2) \
         + cos(radians(lat)) * cos(radians(${lat})) \
         * power(sin(radians(${lng} - lng) / 2), 2)))",
        lat = lat_bind,
        lng = lng_bind,
    )
}

/// Postgres-backed pantry store.
pub struct PostgresPantryStore {
    pool: PgPool,
}

impl PostgresPantryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, id: Uuid, pantry: &NewPantry) -> Result<Pantry> {
        let sql = format!(
            "INSERT INTO pantries ({INSERT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, NOW())
             RETURNING *"
        );

        bind_new_pantry(sqlx::query_as::<_, Pantry>(&sql).bind(id), pantry)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert pantry")
    }
}

/// Bind the NewPantry fields in INSERT_COLUMNS order (after the id).
fn bind_new_pantry<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, Pantry, sqlx::postgres::PgArguments>,
    pantry: &'q NewPantry,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Pantry, sqlx::postgres::PgArguments> {
    query
        .bind(&pantry.name)
        .bind(&pantry.address)
        .bind(pantry.lat)
        .bind(pantry.lng)
        .bind(&pantry.city)
        .bind(&pantry.state)
        .bind(pantry.status)
        .bind(&pantry.hours_notes)
        .bind(&pantry.hours_today)
        .bind(&pantry.eligibility_rules)
        .bind(pantry.is_id_required)
        .bind(&pantry.residency_req)
        .bind(&pantry.special_notes)
        .bind(pantry.confidence)
        .bind(&pantry.source_url)
        .bind(&pantry.discovered_via)
        .bind(pantry.google_places_only)
}

#[async_trait]
impl BasePantryStore for PostgresPantryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pantry>> {
        sqlx::query_as::<_, Pantry>("SELECT * FROM pantries WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up pantry by id")
    }

    async fn list_all(&self, limit: i64) -> Result<Vec<Pantry>> {
        sqlx::query_as::<_, Pantry>("SELECT * FROM pantries ORDER BY last_updated DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list pantries")
    }

    async fn find_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<Pantry>> {
        let distance = distance_sql(1, 2);
        let sql = format!(
            "SELECT * FROM pantries WHERE {distance} <= $3 ORDER BY {distance} LIMIT $4"
        );

        sqlx::query_as::<_, Pantry>(&sql)
            .bind(lat)
            .bind(lng)
            .bind(radius_meters)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query pantries by proximity")
    }

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Pantry>> {
        sqlx::query_as::<_, Pantry>("SELECT * FROM pantries WHERE source_url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up pantry by source URL")
    }

    async fn find_fresh_by_name_near(
        &self,
        name: &str,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Pantry>> {
        let distance = distance_sql(2, 3);
        let sql = format!(
            "SELECT * FROM pantries
             WHERE LOWER(name) = LOWER($1)
               AND last_updated >= $4
               AND {distance} <= $5
             LIMIT 1"
        );

        sqlx::query_as::<_, Pantry>(&sql)
            .bind(name)
            .bind(lat)
            .bind(lng)
            .bind(cutoff)
            .bind(radius_meters)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up pantry by name and proximity")
    }

    async fn count_fresh_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<i64> {
        let distance = distance_sql(1, 2);
        let sql = format!(
            "SELECT COUNT(*) FROM pantries WHERE last_updated >= $3 AND {distance} <= $4"
        );

        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(lat)
            .bind(lng)
            .bind(cutoff)
            .bind(radius_meters)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count fresh pantries")?;

        Ok(count)
    }

    async fn upsert_by_source_url(&self, pantry: NewPantry) -> Result<Pantry> {
        anyhow::ensure!(
            pantry.source_url.is_some(),
            "upsert_by_source_url requires a source URL"
        );

        let sql = format!(
            "INSERT INTO pantries ({INSERT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, NOW())
             ON CONFLICT (source_url) WHERE source_url IS NOT NULL DO UPDATE SET
                name = EXCLUDED.name,
                address = EXCLUDED.address,
                lat = EXCLUDED.lat,
                lng = EXCLUDED.lng,
                city = EXCLUDED.city,
                state = EXCLUDED.state,
                status = EXCLUDED.status,
                hours_notes = EXCLUDED.hours_notes,
                hours_today = EXCLUDED.hours_today,
                eligibility_rules = EXCLUDED.eligibility_rules,
                is_id_required = EXCLUDED.is_id_required,
                residency_req = EXCLUDED.residency_req,
                special_notes = EXCLUDED.special_notes,
                confidence = EXCLUDED.confidence,
                discovered_via = EXCLUDED.discovered_via,
                google_places_only = EXCLUDED.google_places_only,
                last_updated = NOW()
             RETURNING *"
        );

        bind_new_pantry(sqlx::query_as::<_, Pantry>(&sql).bind(Uuid::new_v4()), &pantry)
            .fetch_one(&self.pool)
            .await
            .context("Failed to upsert pantry by source URL")
    }

    async fn upsert_basic(&self, pantry: NewPantry) -> Result<Pantry> {
        if pantry.source_url.is_some() {
            return self.upsert_by_source_url(pantry).await;
        }

        // No URL: match an existing record by name + proximity, then
        // replace it in place; otherwise insert a new record.
        let distance = distance_sql(2, 3);
        let sql = format!(
            "SELECT * FROM pantries
             WHERE LOWER(name) = LOWER($1) AND {distance} <= $4
             LIMIT 1"
        );

        let existing = sqlx::query_as::<_, Pantry>(&sql)
            .bind(&pantry.name)
            .bind(pantry.lat)
            .bind(pantry.lng)
            .bind(BASIC_UPSERT_RADIUS_M)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up pantry for basic upsert")?;

        match existing {
            Some(current) => {
                let sql = "UPDATE pantries SET
                        name = $2, address = $3, lat = $4, lng = $5, city = $6, state = $7,
                        status = $8, hours_notes = $9, hours_today = $10,
                        eligibility_rules = $11, is_id_required = $12, residency_req = $13,
                        special_notes = $14, confidence = $15, discovered_via = $16,
                        google_places_only = $17, last_updated = NOW()
                     WHERE id = $1
                     RETURNING *";

                sqlx::query_as::<_, Pantry>(sql)
                    .bind(current.id)
                    .bind(&pantry.name)
                    .bind(&pantry.address)
                    .bind(pantry.lat)
                    .bind(pantry.lng)
                    .bind(&pantry.city)
                    .bind(&pantry.state)
                    .bind(pantry.status)
                    .bind(&pantry.hours_notes)
                    .bind(&pantry.hours_today)
                    .bind(&pantry.eligibility_rules)
                    .bind(pantry.is_id_required)
                    .bind(&pantry.residency_req)
                    .bind(&pantry.special_notes)
                    .bind(pantry.confidence)
                    .bind(&pantry.discovered_via)
                    .bind(pantry.google_places_only)
                    .fetch_one(&self.pool)
                    .await
                    .context("Failed to update pantry in basic upsert")
            }
            None => self.insert(Uuid::new_v4(), &pantry).await,
        }
    }

    async fn update_from_ingestion(
        &self,
        id: Uuid,
        update: &PantryUpdate,
        source_url: &str,
    ) -> Result<Pantry> {
        let sql = "UPDATE pantries SET
                status = $2, hours_notes = $3, hours_today = $4, eligibility_rules = $5,
                is_id_required = $6, residency_req = $7, special_notes = $8, confidence = $9,
                source_url = $10, last_updated = NOW()
             WHERE id = $1
             RETURNING *";

        sqlx::query_as::<_, Pantry>(sql)
            .bind(id)
            .bind(update.status)
            .bind(&update.hours_notes)
            .bind(&update.hours_today)
            .bind(&update.eligibility_rules)
            .bind(update.is_id_required)
            .bind(&update.residency_req)
            .bind(&update.special_notes)
            .bind(update.confidence)
            .bind(source_url)
            .fetch_one(&self.pool)
            .await
            .context("Failed to merge ingestion results into pantry")
    }
}

/// In-memory pantry store with the same matching semantics as the
/// Postgres store. Used by orchestrator and dedup tests.
#[derive(Default)]
pub struct MemoryPantryStore {
    pantries: RwLock<HashMap<Uuid, Pantry>>,
}

impl MemoryPantryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing upsert semantics.
    pub fn seed(&self, pantry: Pantry) {
        self.pantries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pantry.id, pantry);
    }

    pub fn all(&self) -> Vec<Pantry> {
        self.pantries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.pantries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn materialize(id: Uuid, pantry: NewPantry) -> Pantry {
        Pantry {
            id,
            name: pantry.name,
            address: pantry.address,
            lat: pantry.lat,
            lng: pantry.lng,
            city: pantry.city,
            state: pantry.state,
            status: pantry.status,
            hours_notes: pantry.hours_notes,
            hours_today: pantry.hours_today,
            eligibility_rules: pantry.eligibility_rules,
            is_id_required: pantry.is_id_required,
            residency_req: pantry.residency_req,
            special_notes: pantry.special_notes,
            confidence: pantry.confidence,
            source_url: pantry.source_url,
            discovered_via: pantry.discovered_via,
            google_places_only: pantry.google_places_only,
            last_updated: Utc::now(),
        }
    }
}

#[async_trait]
impl BasePantryStore for MemoryPantryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pantry>> {
        Ok(self
            .pantries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn list_all(&self, limit: i64) -> Result<Vec<Pantry>> {
        let mut all = self.all();
        all.sort_by_key(|p| std::cmp::Reverse(p.last_updated));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn find_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        limit: i64,
    ) -> Result<Vec<Pantry>> {
        let mut matches: Vec<(f64, Pantry)> = self
            .all()
            .into_iter()
            .map(|p| (haversine_meters(lat, lng, p.lat, p.lng), p))
            .filter(|(d, _)| *d <= radius_meters)
            .collect();
        matches.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(matches
            .into_iter()
            .take(limit as usize)
            .map(|(_, p)| p)
            .collect())
    }

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Pantry>> {
        Ok(self
            .all()
            .into_iter()
            .find(|p| p.source_url.as_deref() == Some(url)))
    }

    async fn find_fresh_by_name_near(
        &self,
        name: &str,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Pantry>> {
        Ok(self.all().into_iter().find(|p| {
            p.name.eq_ignore_ascii_case(name)
                && p.last_updated >= cutoff
                && haversine_meters(lat, lng, p.lat, p.lng) <= radius_meters
        }))
    }

    async fn count_fresh_near(
        &self,
        lat: f64,
        lng: f64,
        radius_meters: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(self
            .all()
            .iter()
            .filter(|p| {
                p.last_updated >= cutoff
                    && haversine_meters(lat, lng, p.lat, p.lng) <= radius_meters
            })
            .count() as i64)
    }

    async fn upsert_by_source_url(&self, pantry: NewPantry) -> Result<Pantry> {
        let url = pantry
            .source_url
            .clone()
            .context("upsert_by_source_url requires a source URL")?;

        let existing_id = self
            .all()
            .iter()
            .find(|p| p.source_url.as_deref() == Some(url.as_str()))
            .map(|p| p.id);

        let id = existing_id.unwrap_or_else(Uuid::new_v4);
        let record = Self::materialize(id, pantry);
        self.seed(record.clone());
        Ok(record)
    }

    async fn upsert_basic(&self, pantry: NewPantry) -> Result<Pantry> {
        if pantry.source_url.is_some() {
            return self.upsert_by_source_url(pantry).await;
        }

        let existing_id = self
            .all()
            .iter()
            .find(|p| {
                p.name.eq_ignore_ascii_case(&pantry.name)
                    && haversine_meters(pantry.lat, pantry.lng, p.lat, p.lng)
                        <= BASIC_UPSERT_RADIUS_M
            })
            .map(|p| p.id);

        let id = existing_id.unwrap_or_else(Uuid::new_v4);
        let record = Self::materialize(id, pantry);
        self.seed(record.clone());
        Ok(record)
    }

    async fn update_from_ingestion(
        &self,
        id: Uuid,
        update: &PantryUpdate,
        source_url: &str,
    ) -> Result<Pantry> {
        let mut pantries = self.pantries.write().unwrap_or_else(|e| e.into_inner());
        let pantry = pantries
            .get_mut(&id)
            .with_context(|| format!("No pantry with id {id}"))?;

        pantry.status = update.status;
        pantry.hours_notes = update.hours_notes.clone();
        pantry.hours_today = Some(update.hours_today.clone());
        pantry.eligibility_rules = update.eligibility_rules.clone();
        pantry.is_id_required = update.is_id_required;
        pantry.residency_req = update.residency_req.clone();
        pantry.special_notes = update.special_notes.clone();
        pantry.confidence = update.confidence;
        pantry.source_url = Some(source_url.to_string());
        pantry.last_updated = Utc::now();

        Ok(pantry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::pantry::models::PantryStatus;

    fn new_pantry(name: &str, source_url: Option<&str>) -> NewPantry {
        NewPantry {
            name: name.to_string(),
            address: "123 Main St, Denver, CO 80202, USA".to_string(),
            lat: 39.7392,
            lng: -104.9903,
            city: Some("Denver".to_string()),
            state: Some("CO".to_string()),
            status: PantryStatus::Unknown,
            hours_notes: "Not listed on website".to_string(),
            hours_today: Some("Not listed".to_string()),
            eligibility_rules: vec![],
            is_id_required: None,
            residency_req: None,
            special_notes: None,
            confidence: 3,
            source_url: source_url.map(str::to_string),
            discovered_via: Some("discovery".to_string()),
            google_places_only: source_url.is_none(),
        }
    }

    #[tokio::test]
    async fn upsert_by_url_replaces_in_place() {
        let store = MemoryPantryStore::new();

        let first = store
            .upsert_by_source_url(new_pantry("A", Some("https://a.org")))
            .await
            .unwrap();

        let mut updated = new_pantry("A", Some("https://a.org"));
        updated.confidence = 8;
        let second = store.upsert_by_source_url(updated).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.confidence, 8);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn upsert_by_url_requires_url() {
        let store = MemoryPantryStore::new();
        assert!(store
            .upsert_by_source_url(new_pantry("A", None))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn upsert_basic_matches_by_name_and_proximity() {
        let store = MemoryPantryStore::new();

        let first = store.upsert_basic(new_pantry("Church Pantry", None)).await.unwrap();
        let second = store
            .upsert_basic(new_pantry("church pantry", None))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn upsert_basic_inserts_distant_same_name() {
        let store = MemoryPantryStore::new();

        store.upsert_basic(new_pantry("Pantry", None)).await.unwrap();

        let mut far = new_pantry("Pantry", None);
        far.lat += 0.1; // ~11km away
        store.upsert_basic(far).await.unwrap();

        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn find_fresh_by_name_respects_cutoff() {
        let store = MemoryPantryStore::new();
        store.upsert_basic(new_pantry("Fresh Pantry", None)).await.unwrap();

        let past_cutoff = Utc::now() - chrono::Duration::hours(1);
        let found = store
            .find_fresh_by_name_near("fresh pantry", 39.7392, -104.9903, 200.0, past_cutoff)
            .await
            .unwrap();
        assert!(found.is_some());

        let future_cutoff = Utc::now() + chrono::Duration::hours(1);
        let stale = store
            .find_fresh_by_name_near("fresh pantry", 39.7392, -104.9903, 200.0, future_cutoff)
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn find_near_sorts_by_distance() {
        let store = MemoryPantryStore::new();

        let mut near = new_pantry("Near", Some("https://near.org"));
        near.lat = 39.7400;
        store.upsert_by_source_url(near).await.unwrap();

        let mut nearer = new_pantry("Nearer", Some("https://nearer.org"));
        nearer.lat = 39.7393;
        store.upsert_by_source_url(nearer).await.unwrap();

        let results = store.find_near(39.7392, -104.9903, 5_000.0, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "Nearer");
    }

    #[tokio::test]
    async fn update_from_ingestion_merges_fields() {
        let store = MemoryPantryStore::new();
        let pantry = store.upsert_basic(new_pantry("A", None)).await.unwrap();

        let update = PantryUpdate {
            status: PantryStatus::Open,
            hours_notes: "Mon-Fri 9-5".to_string(),
            hours_today: "9-5".to_string(),
            eligibility_rules: vec!["Open to all".to_string()],
            is_id_required: Some(false),
            residency_req: None,
            special_notes: None,
            confidence: 8,
        };

        let merged = store
            .update_from_ingestion(pantry.id, &update, "https://a.org")
            .await
            .unwrap();

        assert_eq!(merged.status, PantryStatus::Open);
        assert_eq!(merged.confidence, 8);
        assert_eq!(merged.source_url.as_deref(), Some("https://a.org"));
        assert_eq!(merged.name, "A");
    }
}

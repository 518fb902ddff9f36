//! Candidate deduplication against the record store.
//!
//! Classifies each search hit exactly once into one of three disjoint
//! sets, making no assumptions about search-result ordering:
//!
//! - `to_scrape`: has (or acquires) a website URL and is not fresh in the
//!   store -> full pipeline
//! - `to_store_basic`: no website URL even after the Place Details
//!   fallback -> minimal record
//! - `skipped`: already fresh in the store
//!
//! One or more store lookups run per candidate. Candidate counts per job
//! are small (<= 10), so per-candidate queries beat batching complexity.
//! Two concurrent jobs over overlapping areas can both classify the same
//! URL as `to_scrape` (read-then-decide); the URL upsert keeps the store
//! consistent, so the race is accepted rather than locked away.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use super::models::PlaceCandidate;
use crate::domains::pantry::store::BasePantryStore;
use crate::kernel::traits::BasePlaceSearch;

/// Stored records updated within this window are considered fresh.
pub const FRESHNESS_HOURS: i64 = 24;

/// Name-match radius for candidates without any website URL.
const NAME_MATCH_RADIUS_TIGHT_M: f64 = 200.0;

/// Wider name-match radius for candidates with a URL; covers the same
/// physical location previously ingested under a slightly different URL.
const NAME_MATCH_RADIUS_WIDE_M: f64 = 500.0;

/// The three disjoint classification sets. Every input candidate lands in
/// exactly one.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub to_scrape: Vec<PlaceCandidate>,
    pub to_store_basic: Vec<PlaceCandidate>,
    pub skipped: Vec<PlaceCandidate>,
}

/// Partition candidates by store state. Deterministic for a fixed store
/// state and candidate list.
pub async fn partition_candidates(
    places: &dyn BasePlaceSearch,
    store: &dyn BasePantryStore,
    candidates: Vec<PlaceCandidate>,
    now: DateTime<Utc>,
) -> Result<DedupOutcome> {
    let cutoff = now - Duration::hours(FRESHNESS_HOURS);
    let mut outcome = DedupOutcome::default();

    for mut candidate in candidates {
        // Resolve a missing website via the Place Details fallback
        let url = if let Some(url) = candidate.website_url.clone() {
            url
        } else if let Some(website) = places.place_website(&candidate.place_id).await {
            candidate.website_url = Some(website.clone());
            website
        } else {
            // No URL obtainable: a fresh name + proximity match means the
            // location is already covered
            let fresh_match = store
                .find_fresh_by_name_near(
                    &candidate.name,
                    candidate.lat,
                    candidate.lng,
                    NAME_MATCH_RADIUS_TIGHT_M,
                    cutoff,
                )
                .await?;

            if fresh_match.is_some() {
                outcome.skipped.push(candidate);
            } else {
                outcome.to_store_basic.push(candidate);
            }
            continue;
        };

        // Fresh by exact URL?
        if let Some(existing) = store.find_by_source_url(&url).await? {
            if existing.last_updated >= cutoff {
                outcome.skipped.push(candidate);
                continue;
            }
        }

        // Fresh by name + proximity under a different URL?
        let fresh_match = store
            .find_fresh_by_name_near(
                &candidate.name,
                candidate.lat,
                candidate.lng,
                NAME_MATCH_RADIUS_WIDE_M,
                cutoff,
            )
            .await?;

        if fresh_match.is_some() {
            outcome.skipped.push(candidate);
            continue;
        }

        outcome.to_scrape.push(candidate);
    }

    Ok(outcome)
}

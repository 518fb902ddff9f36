//! Pantry read routes and manual re-ingestion.
//!
//! GET  /pantries               recent records
//! GET  /pantries/nearby        geospatial read
//! POST /pantries/:id/ingest    re-run the pipeline for one stored record

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::domains::discovery::{IngestionError, Stage};
use crate::domains::pantry::models::Pantry;
use crate::server::app::AppState;
use crate::server::routes::discovery::ErrorBody;

const DEFAULT_LIST_LIMIT: i64 = 100;
const DEFAULT_NEARBY_RADIUS_M: f64 = 8_000.0;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn list_pantries_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Pantry>>, (StatusCode, Json<ErrorBody>)> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    state
        .pantry_store
        .list_all(limit)
        .await
        .map(Json)
        .map_err(internal_error)
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_meters: Option<f64>,
    pub limit: Option<i64>,
}

pub async fn nearby_pantries_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<Pantry>>, (StatusCode, Json<ErrorBody>)> {
    let radius = query.radius_meters.unwrap_or(DEFAULT_NEARBY_RADIUS_M);
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
    state
        .pantry_store
        .find_near(query.lat, query.lng, radius, limit)
        .await
        .map(Json)
        .map_err(internal_error)
}

/// Re-run scrape -> extract -> validate for one stored pantry and merge
/// the result into its record. Scrape/extract failures map to 502
/// (upstream), validation failures to 422.
pub async fn ingest_pantry_handler(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Pantry>, (StatusCode, Json<serde_json::Value>)> {
    let pantry = state
        .pantry_store
        .find_by_id(id)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": format!("Pantry {id} not found") })),
            )
        })?;

    let Some(url) = pantry.source_url.clone() else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Pantry has no source URL to ingest" })),
        ));
    };

    let update = state
        .discovery
        .pipeline()
        .ingest(&url)
        .await
        .map_err(ingestion_failure)?;

    state
        .pantry_store
        .update_from_ingestion(pantry.id, &update, &url)
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })
}

fn ingestion_failure(err: IngestionError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err.stage {
        Stage::Scrape | Stage::Extract => StatusCode::BAD_GATEWAY,
        Stage::Validate => StatusCode::UNPROCESSABLE_ENTITY,
        Stage::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(serde_json::json!({
            "error": err.to_string(),
            "stage": err.stage,
            "reason": err.reason,
        })),
    )
}

fn internal_error(err: anyhow::Error) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_and_extract_failures_map_to_bad_gateway() {
        for stage in [Stage::Scrape, Stage::Extract] {
            let (status, _) =
                ingestion_failure(IngestionError::new(stage, "boom", "https://x.org"));
            assert_eq!(status, StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn validation_failure_maps_to_unprocessable() {
        let (status, _) =
            ingestion_failure(IngestionError::new(Stage::Validate, "bad", "https://x.org"));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unknown_failure_maps_to_internal_error() {
        let (status, body) =
            ingestion_failure(IngestionError::new(Stage::Unknown, "???", "https://x.org"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["stage"], "unknown");
    }
}

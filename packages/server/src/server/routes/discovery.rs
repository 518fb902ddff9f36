//! Discovery routes - start a job, poll its status, stream its progress.
//!
//! POST /pantries/discover         start a background discovery job
//! GET  /pantries/discover/status/:job_id
//! GET  /pantries/discover/stream/:job_id   SSE forwarding of the job's events

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Extension, Path};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domains::discovery::{DiscoveryJob, DiscoveryStatus};
use crate::server::app::AppState;

pub const MIN_RADIUS_M: u32 = 500;
pub const MAX_RADIUS_M: u32 = 50_000;
const DEFAULT_RADIUS_M: u32 = 8_000;

fn default_radius() -> u32 {
    DEFAULT_RADIUS_M
}

#[derive(Debug, Deserialize)]
pub struct DiscoverRequest {
    pub query: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default = "default_radius")]
    pub radius_meters: u32,
}

#[derive(Serialize)]
pub struct DiscoverResponse {
    pub job_id: Uuid,
    pub status: DiscoveryStatus,
    pub stream_url: String,
    /// Fresh records already covering the area, so the client can show an
    /// "already covered" hint before any events arrive.
    pub existing_pantries: i64,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn bad_request(message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn validate(request: &DiscoverRequest) -> Result<(), (StatusCode, Json<ErrorBody>)> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if !(-90.0..=90.0).contains(&request.lat) {
        return Err(bad_request("lat must be between -90 and 90"));
    }
    if !(-180.0..=180.0).contains(&request.lng) {
        return Err(bad_request("lng must be between -180 and 180"));
    }
    if !(MIN_RADIUS_M..=MAX_RADIUS_M).contains(&request.radius_meters) {
        return Err(bad_request(format!(
            "radius_meters must be between {MIN_RADIUS_M} and {MAX_RADIUS_M}"
        )));
    }
    Ok(())
}

/// Start a discovery job. Returns immediately; progress is observed via
/// the status or stream endpoints.
pub async fn start_discovery_handler(
    Extension(state): Extension<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<DiscoverResponse>, (StatusCode, Json<ErrorBody>)> {
    validate(&request)?;

    let existing_pantries = state
        .discovery
        .count_fresh_pantries(request.lat, request.lng, request.radius_meters)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Fresh pantry pre-count failed");
            0
        });

    let job = state
        .discovery
        .start_job(
            &request.query,
            request.lat,
            request.lng,
            request.radius_meters,
            &addr.ip().to_string(),
        )
        .await;

    Ok(Json(DiscoverResponse {
        job_id: job.job_id,
        status: job.status,
        stream_url: format!("/pantries/discover/stream/{}", job.job_id),
        existing_pantries,
    }))
}

/// Poll a job's current state.
pub async fn discovery_status_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<DiscoveryJob>, (StatusCode, Json<ErrorBody>)> {
    match state.discovery.get_status(job_id).await {
        Some(job) => Ok(Json(job)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("Job {job_id} not found"),
            }),
        )),
    }
}

/// SSE stream of a job's events. Forwards each event verbatim with its
/// kind as the SSE event name. No axum keep-alive: the orchestrator emits
/// its own heartbeat events on idle.
pub async fn discovery_stream_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = state.discovery.event_stream(job_id).filter_map(|event| async move {
        let value = serde_json::to_value(&event).ok()?;
        let data = value.get("data").cloned().unwrap_or_else(|| serde_json::json!({}));
        Event::default()
            .event(event.kind())
            .json_data(&data)
            .ok()
            .map(Ok)
    });

    Sse::new(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(lat: f64, lng: f64, radius_meters: u32) -> DiscoverRequest {
        DiscoverRequest {
            query: "Denver, CO".to_string(),
            lat,
            lng,
            radius_meters,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate(&request(39.7, -104.9, 8_000)).is_ok());
    }

    #[test]
    fn radius_bounds_enforced() {
        assert!(validate(&request(39.7, -104.9, MIN_RADIUS_M)).is_ok());
        assert!(validate(&request(39.7, -104.9, MAX_RADIUS_M)).is_ok());
        assert!(validate(&request(39.7, -104.9, MIN_RADIUS_M - 1)).is_err());
        assert!(validate(&request(39.7, -104.9, MAX_RADIUS_M + 1)).is_err());
    }

    #[test]
    fn coordinates_bounds_enforced() {
        assert!(validate(&request(90.1, 0.0, 8_000)).is_err());
        assert!(validate(&request(-90.1, 0.0, 8_000)).is_err());
        assert!(validate(&request(0.0, 180.1, 8_000)).is_err());
        assert!(validate(&request(0.0, -180.1, 8_000)).is_err());
    }

    #[test]
    fn blank_query_rejected() {
        let mut r = request(39.7, -104.9, 8_000);
        r.query = "   ".to_string();
        assert!(validate(&r).is_err());
    }

    #[test]
    fn default_radius_applied() {
        let r: DiscoverRequest = serde_json::from_value(serde_json::json!({
            "query": "Denver",
            "lat": 39.7,
            "lng": -104.9,
        }))
        .unwrap();
        assert_eq!(r.radius_meters, DEFAULT_RADIUS_M);
    }
}

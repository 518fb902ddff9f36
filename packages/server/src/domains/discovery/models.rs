//! Discovery models - job lifecycle state and place-search hits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a discovery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Full status of a discovery job (for the polling endpoint).
///
/// Counts only grow while the job is `Running`; once a terminal status is
/// set the record never returns to `Running` and stops changing, except
/// that channel cleanup may later drop its event queue.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryJob {
    pub job_id: Uuid,
    pub status: DiscoveryStatus,
    pub query: String,
    pub urls_found: u32,
    pub urls_processed: u32,
    pub urls_succeeded: u32,
    pub urls_failed: u32,
    pub urls_skipped: u32,
    pub pantry_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
}

impl DiscoveryJob {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            status: DiscoveryStatus::Running,
            query: query.into(),
            urls_found: 0,
            urls_processed: 0,
            urls_succeeded: 0,
            urls_failed: 0,
            urls_skipped: 0,
            pantry_ids: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != DiscoveryStatus::Running
    }
}

/// A food pantry/bank found via the place-search API. Ephemeral - not
/// persisted directly; `place_id` is the dedup key within one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub website_url: Option<String>,
    pub place_id: String,
}

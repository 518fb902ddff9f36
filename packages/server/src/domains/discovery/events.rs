//! Discovery job events - the ordered progress messages streamed to clients.
//!
//! Events are a closed tagged union: each kind has its own payload shape,
//! serialized as `{"event": <kind>, "data": {...}}` so the route layer can
//! forward them verbatim as SSE.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::DiscoveryJob;
use super::pipeline::Stage;
use crate::domains::pantry::models::PantryStatus;

/// Reason attached to every `pantry_skipped` event.
pub const SKIP_REASON_FRESH: &str = "already_fresh";

/// A single ordered message describing job progress.
///
/// Within one job: exactly one `job_started` opens the sequence (unless the
/// job was already terminal when the consumer attached), exactly one
/// terminal event (`complete` or `error`) closes it, and heartbeats may
/// appear any number of times between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    JobStarted {
        job_id: Uuid,
        query: String,
        urls_found: u32,
    },
    PantryDiscovered {
        pantry_id: Uuid,
        name: String,
        address: String,
        lat: f64,
        lng: f64,
        status: PantryStatus,
        confidence: i32,
        source_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        google_places_only: Option<bool>,
    },
    PantrySkipped {
        source_url: String,
        name: String,
        reason: String,
    },
    PantryFailed {
        source_url: String,
        name: String,
        stage: Stage,
        reason: String,
    },
    Progress {
        processed: u32,
        total: u32,
        succeeded: u32,
        failed: u32,
    },
    Complete {
        job_id: Uuid,
        found: u32,
        failed: u32,
        skipped: u32,
        duration_ms: u64,
        timed_out: bool,
    },
    Error {
        message: String,
    },
    Heartbeat {},
}

impl DiscoveryEvent {
    /// The SSE event name for this kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => "job_started",
            Self::PantryDiscovered { .. } => "pantry_discovered",
            Self::PantrySkipped { .. } => "pantry_skipped",
            Self::PantryFailed { .. } => "pantry_failed",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Heartbeat {} => "heartbeat",
        }
    }

    /// Whether this event ends the job's event sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// The summary event for a finished (or finishing) job.
    pub fn complete_for(job: &DiscoveryJob) -> Self {
        Self::Complete {
            job_id: job.job_id,
            found: job.urls_succeeded,
            failed: job.urls_failed,
            skipped: job.urls_skipped,
            duration_ms: job.duration_ms.unwrap_or(0),
            timed_out: job.status == super::models::DiscoveryStatus::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_started_serializes_as_event_data() {
        let event = DiscoveryEvent::JobStarted {
            job_id: Uuid::nil(),
            query: "Denver, CO".to_string(),
            urls_found: 4,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "job_started");
        assert_eq!(value["data"]["query"], "Denver, CO");
        assert_eq!(value["data"]["urls_found"], 4);
    }

    #[test]
    fn discovered_omits_marker_when_absent() {
        let event = DiscoveryEvent::PantryDiscovered {
            pantry_id: Uuid::nil(),
            name: "Pantry".to_string(),
            address: "123 Main St".to_string(),
            lat: 39.7,
            lng: -104.9,
            status: PantryStatus::Open,
            confidence: 8,
            source_url: Some("https://pantry.org".to_string()),
            google_places_only: None,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "pantry_discovered");
        assert_eq!(value["data"]["status"], "OPEN");
        assert!(value["data"].get("google_places_only").is_none());
    }

    #[test]
    fn discovered_carries_marker_for_basic_records() {
        let event = DiscoveryEvent::PantryDiscovered {
            pantry_id: Uuid::nil(),
            name: "Church Pantry".to_string(),
            address: "456 Church St".to_string(),
            lat: 39.7,
            lng: -104.9,
            status: PantryStatus::Unknown,
            confidence: 3,
            source_url: None,
            google_places_only: Some(true),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["google_places_only"], true);
        assert_eq!(value["data"]["confidence"], 3);
        assert!(value["data"]["source_url"].is_null());
    }

    #[test]
    fn failed_carries_stage_and_reason() {
        let event = DiscoveryEvent::PantryFailed {
            source_url: "https://bad.org".to_string(),
            name: "Bad Pantry".to_string(),
            stage: Stage::Scrape,
            reason: "Timeout".to_string(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "pantry_failed");
        assert_eq!(value["data"]["stage"], "scrape");
        assert_eq!(value["data"]["reason"], "Timeout");
    }

    #[test]
    fn heartbeat_serializes_empty_data() {
        let value = serde_json::to_value(DiscoveryEvent::Heartbeat {}).unwrap();
        assert_eq!(value["event"], "heartbeat");
        assert_eq!(value["data"], serde_json::json!({}));
    }

    #[test]
    fn terminal_detection() {
        assert!(DiscoveryEvent::Error { message: "x".into() }.is_terminal());
        assert!(!DiscoveryEvent::Heartbeat {}.is_terminal());
        assert!(!DiscoveryEvent::Progress {
            processed: 1,
            total: 2,
            succeeded: 1,
            failed: 0
        }
        .is_terminal());
    }

    #[test]
    fn events_roundtrip_serialize() {
        let events = vec![
            DiscoveryEvent::JobStarted {
                job_id: Uuid::new_v4(),
                query: "Denver".to_string(),
                urls_found: 2,
            },
            DiscoveryEvent::PantrySkipped {
                source_url: "https://fresh.org".to_string(),
                name: "Fresh".to_string(),
                reason: SKIP_REASON_FRESH.to_string(),
            },
            DiscoveryEvent::Progress {
                processed: 1,
                total: 2,
                succeeded: 1,
                failed: 0,
            },
            DiscoveryEvent::Complete {
                job_id: Uuid::new_v4(),
                found: 1,
                failed: 1,
                skipped: 0,
                duration_ms: 1500,
                timed_out: false,
            },
            DiscoveryEvent::Heartbeat {},
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: DiscoveryEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back.kind(), event.kind());
        }
    }
}

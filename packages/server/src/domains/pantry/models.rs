//! Pantry model - a food-assistance location with LLM-extracted detail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Operational status of a pantry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum PantryStatus {
    Open,
    Closed,
    Waitlist,
    Unknown,
}

impl PantryStatus {
    /// The exact strings accepted from extraction payloads (case-sensitive).
    pub const VALID: [&'static str; 4] = ["OPEN", "CLOSED", "WAITLIST", "UNKNOWN"];

    /// Parse an extraction status string; unrecognized values collapse to
    /// `Unknown` (validation rejects them before this is reached).
    pub fn parse(value: &str) -> Self {
        match value {
            "OPEN" => Self::Open,
            "CLOSED" => Self::Closed,
            "WAITLIST" => Self::Waitlist,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Waitlist => "WAITLIST",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// A persisted pantry record.
///
/// Identity is the source URL when present (unique, sparse); records
/// without a URL are matched by name + proximity. `city`/`state` come from
/// best-effort address parsing and may be null.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Pantry {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub status: PantryStatus,
    pub hours_notes: String,
    pub hours_today: Option<String>,
    pub eligibility_rules: Vec<String>,
    pub is_id_required: Option<bool>,
    pub residency_req: Option<String>,
    pub special_notes: Option<String>,
    pub confidence: i32,
    pub source_url: Option<String>,
    pub discovered_via: Option<String>,
    /// Set when the location has no website URL - the record carries
    /// place-search data only and can never be backed by page content.
    pub google_places_only: bool,
    pub last_updated: DateTime<Utc>,
}

/// Insert/upsert payload for a pantry record.
#[derive(Debug, Clone)]
pub struct NewPantry {
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub status: PantryStatus,
    pub hours_notes: String,
    pub hours_today: Option<String>,
    pub eligibility_rules: Vec<String>,
    pub is_id_required: Option<bool>,
    pub residency_req: Option<String>,
    pub special_notes: Option<String>,
    pub confidence: i32,
    pub source_url: Option<String>,
    pub discovered_via: Option<String>,
    pub google_places_only: bool,
}

/// Structured data extracted from scraped pantry content.
///
/// Built from a raw extraction payload after the validation gate has
/// accepted it; `from_raw` applies the documented defaults for optional
/// fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryUpdate {
    pub status: PantryStatus,
    pub hours_notes: String,
    pub hours_today: String,
    pub eligibility_rules: Vec<String>,
    pub is_id_required: Option<bool>,
    pub residency_req: Option<String>,
    pub special_notes: Option<String>,
    pub confidence: i32,
}

impl PantryUpdate {
    /// Build from validated raw extraction fields, defaulting everything
    /// the model omitted.
    pub fn from_raw(data: &Value) -> Self {
        let eligibility_rules = data
            .get("eligibility_rules")
            .and_then(Value::as_array)
            .map(|rules| {
                rules
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_else(|| vec!["Open to all - no restrictions listed".to_string()]);

        Self {
            status: data
                .get("status")
                .and_then(Value::as_str)
                .map(PantryStatus::parse)
                .unwrap_or(PantryStatus::Unknown),
            hours_notes: data
                .get("hours_notes")
                .and_then(Value::as_str)
                .unwrap_or("Not listed on website")
                .to_string(),
            hours_today: data
                .get("hours_today")
                .and_then(Value::as_str)
                .unwrap_or("Not listed")
                .to_string(),
            eligibility_rules,
            is_id_required: Some(
                data.get("is_id_required")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            ),
            residency_req: data
                .get("residency_req")
                .and_then(Value::as_str)
                .map(str::to_string),
            special_notes: data
                .get("special_notes")
                .and_then(Value::as_str)
                .map(str::to_string),
            confidence: data
                .get("confidence")
                .and_then(Value::as_i64)
                .unwrap_or(1) as i32,
        }
    }
}

//! Post-extraction validation rules for raw pantry data.
//!
//! Catches bad LLM extractions before they become trusted records. Rules
//! run in a fixed order and the first violation wins.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::domains::pantry::models::PantryStatus;

/// Raised when extracted data fails a validation rule.
#[derive(Debug, Clone, Error)]
#[error("Validation failed on '{field}': {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a raw extraction payload against business rules.
pub fn validate_extraction(data: &Value) -> Result<(), ValidationError> {
    validate_confidence(data)?;
    validate_status(data)?;
    validate_name(data)?;
    validate_eligibility_rules(data)?;
    validate_last_updated(data)?;
    validate_is_id_required(data)?;
    Ok(())
}

fn validate_confidence(data: &Value) -> Result<(), ValidationError> {
    let confidence = data.get("confidence").filter(|v| !v.is_null());
    let Some(confidence) = confidence else {
        return Err(ValidationError::new("confidence", "must not be null"));
    };
    let Some(value) = confidence.as_i64() else {
        return Err(ValidationError::new("confidence", "must be an integer"));
    };
    if !(1..=10).contains(&value) {
        return Err(ValidationError::new(
            "confidence",
            format!("must be 1-10, got {value}"),
        ));
    }
    Ok(())
}

fn validate_status(data: &Value) -> Result<(), ValidationError> {
    let status = data.get("status").filter(|v| !v.is_null());
    let Some(status) = status else {
        return Err(ValidationError::new("status", "must not be null"));
    };
    // Case-sensitive exact match against the four-value enum
    let valid = status
        .as_str()
        .is_some_and(|s| PantryStatus::VALID.contains(&s));
    if !valid {
        return Err(ValidationError::new(
            "status",
            format!("must be one of {:?}, got {status}", PantryStatus::VALID),
        ));
    }
    Ok(())
}

/// Name is only validated when present - not all extractions include it.
fn validate_name(data: &Value) -> Result<(), ValidationError> {
    let Some(name) = data.get("name").filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let valid = name.as_str().is_some_and(|s| !s.trim().is_empty());
    if !valid {
        return Err(ValidationError::new("name", "must be a non-empty string"));
    }
    Ok(())
}

fn validate_eligibility_rules(data: &Value) -> Result<(), ValidationError> {
    let Some(rules) = data.get("eligibility_rules").filter(|v| !v.is_null()) else {
        return Ok(());
    };
    if !rules.is_array() {
        return Err(ValidationError::new("eligibility_rules", "must be a list"));
    }
    Ok(())
}

/// If last_updated is present, it must parse as ISO 8601 and must not be
/// in the future. Naive timestamps are treated as UTC.
fn validate_last_updated(data: &Value) -> Result<(), ValidationError> {
    let Some(last_updated) = data.get("last_updated").filter(|v| !v.is_null()) else {
        return Ok(());
    };
    let Some(raw) = last_updated.as_str() else {
        return Err(ValidationError::new(
            "last_updated",
            "must be a valid ISO 8601 timestamp",
        ));
    };

    let parsed: DateTime<Utc> = if let Ok(aware) = DateTime::parse_from_rfc3339(raw) {
        aware.with_timezone(&Utc)
    } else if let Ok(naive) = raw.parse::<NaiveDateTime>() {
        naive.and_utc()
    } else {
        return Err(ValidationError::new(
            "last_updated",
            "must be a valid ISO 8601 timestamp",
        ));
    };

    if parsed > Utc::now() {
        return Err(ValidationError::new(
            "last_updated",
            "must not be in the future",
        ));
    }
    Ok(())
}

fn validate_is_id_required(data: &Value) -> Result<(), ValidationError> {
    let Some(value) = data.get("is_id_required").filter(|v| !v.is_null()) else {
        return Ok(());
    };
    if !value.is_boolean() {
        return Err(ValidationError::new("is_id_required", "must be a boolean"));
    }
    Ok(())
}

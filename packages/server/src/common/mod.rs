//! Shared helpers used across domains.

pub mod geo;

pub use geo::{haversine_meters, parse_city_state};

//! Geographic math and best-effort address parsing.

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Best-effort extraction of city and state from a formatted address.
///
/// Google Places returns addresses like "123 Main St, Denver, CO 80202, USA".
/// Also handles shorter forms like "Denver, CO 80202". Returns (None, None)
/// when the address shape is unrecognized - callers must tolerate nulls.
pub fn parse_city_state(address: &str) -> (Option<String>, Option<String>) {
    if address.trim().is_empty() {
        return (None, None);
    }

    let parts: Vec<&str> = address.split(',').map(str::trim).collect();

    if parts.len() >= 3 {
        // Typically: [street, city, "STATE ZIP", country]
        // or: [street, city, "STATE ZIP"]
        let (city, state_zip) = if parts.len() >= 4 {
            (parts[parts.len() - 3], parts[parts.len() - 2])
        } else {
            (parts[parts.len() - 2], parts[parts.len() - 1])
        };
        return (Some(city.to_string()), extract_state(state_zip));
    }

    if parts.len() == 2 {
        // "Denver, CO 80202" or "Denver, CO"
        return (Some(parts[0].to_string()), extract_state(parts[1]));
    }

    (None, None)
}

/// Pull a 2-letter state abbreviation out of a "STATE ZIP" fragment.
fn extract_state(state_zip: &str) -> Option<String> {
    let state = state_zip.split_whitespace().next()?;
    if state.len() == 2 && state.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(state.to_uppercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_us_address() {
        let (city, state) = parse_city_state("123 Main St, Denver, CO 80202, USA");
        assert_eq!(city.as_deref(), Some("Denver"));
        assert_eq!(state.as_deref(), Some("CO"));
    }

    #[test]
    fn short_address() {
        let (city, state) = parse_city_state("Denver, CO 80202");
        assert_eq!(city.as_deref(), Some("Denver"));
        assert_eq!(state.as_deref(), Some("CO"));
    }

    #[test]
    fn three_part_address() {
        let (city, state) = parse_city_state("123 Main St, Denver, CO 80202");
        assert_eq!(city.as_deref(), Some("Denver"));
        assert_eq!(state.as_deref(), Some("CO"));
    }

    #[test]
    fn empty_address() {
        assert_eq!(parse_city_state(""), (None, None));
    }

    #[test]
    fn single_token_address() {
        assert_eq!(parse_city_state("Denver"), (None, None));
    }

    #[test]
    fn invalid_state_kept_as_city_only() {
        let (city, state) = parse_city_state("Denver, Colorado 80202");
        assert_eq!(city.as_deref(), Some("Denver"));
        assert_eq!(state, None);
    }

    #[test]
    fn haversine_zero_distance() {
        assert!(haversine_meters(39.7392, -104.9903, 39.7392, -104.9903) < 1e-6);
    }

    #[test]
    fn haversine_known_distance() {
        // Denver Union Station to the Colorado State Capitol, roughly 1.6km
        let d = haversine_meters(39.7527, -105.0003, 39.7393, -104.9848);
        assert!(d > 1_300.0 && d < 2_500.0, "got {}", d);
    }
}

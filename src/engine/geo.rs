//! Great-circle distance helpers used by proximity queries.

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometers spanned by one degree of latitude
const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Haversine distance between two coordinate pairs, in kilometers.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Degree deltas that bound a `radius_km` circle around a latitude, as
/// `(delta_lat, delta_lon)`. Used to prefilter rows with a cheap
/// bounding-box comparison before the exact haversine pass.
pub fn degree_window(lat: f64, radius_km: f64) -> (f64, f64) {
    let dlat = radius_km / KM_PER_DEGREE_LAT;
    let cos_lat = lat.to_radians().cos().abs();
    // Longitude degrees degenerate near the poles; fall back to the
    // whole range rather than divide by ~zero
    let dlon = if cos_lat < 1e-6 {
        180.0
    } else {
        radius_km / (KM_PER_DEGREE_LAT * cos_lat)
    };
    (dlat, dlon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(haversine_km(14.5995, 120.9842, 14.5995, 120.9842), 0.0);
    }

    #[test]
    fn test_one_degree_longitude_at_equator() {
        let d = haversine_km(0.0, 0.0, 0.0, 1.0);
        assert!((111.0..111.4).contains(&d), "got {d}");
    }

    #[test]
    fn test_manila_to_makati() {
        // Roughly 6.6 km between the two city centers
        let d = haversine_km(14.5995, 120.9842, 14.5547, 121.0244);
        assert!((6.0..7.2).contains(&d), "got {d}");
    }

    #[test]
    fn test_manila_to_cebu() {
        let d = haversine_km(14.5995, 120.9842, 10.3157, 123.8854);
        assert!((555.0..585.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_symmetry() {
        let a = haversine_km(14.6, 121.0, 10.3, 123.9);
        let b = haversine_km(10.3, 123.9, 14.6, 121.0);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_degree_window_covers_radius() {
        let (dlat, dlon) = degree_window(14.6, 2.0);
        // The box must not be tighter than the circle it wraps
        assert!(haversine_km(14.6, 121.0, 14.6 + dlat, 121.0) >= 2.0 * 0.99);
        assert!(haversine_km(14.6, 121.0, 14.6, 121.0 + dlon) >= 2.0 * 0.99);
    }

    #[test]
    fn test_degree_window_near_pole() {
        let (_, dlon) = degree_window(90.0, 2.0);
        assert_eq!(dlon, 180.0);
    }
}

//! Spatial math for survey-scale distance and area calculations.
//!
//! Two coordinate systems are used across the engine: geographic lat/lon in
//! decimal degrees, and a local tangent plane in meters anchored at a chosen
//! origin. The tangent plane is an equirectangular approximation and is only
//! meant for survey extents of a few kilometers.

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree used by the local tangent-plane projection.
pub const METERS_PER_DEG: f64 = 111_320.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
///
/// # Returns
/// Distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Total haversine length of a `[lon, lat]` polyline in meters.
pub fn polyline_length_m(coords: &[[f64; 2]]) -> f64 {
    coords
        .windows(2)
        .map(|pair| haversine_distance(pair[0][1], pair[0][0], pair[1][1], pair[1][0]))
        .sum()
}

/// Arithmetic mean of a set of (lat, lon) pairs.
pub fn mean_lat_lon<I>(points: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut count = 0usize;
    let (mut sum_lat, mut sum_lon) = (0.0, 0.0);
    for (lat, lon) in points {
        sum_lat += lat;
        sum_lon += lon;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some((sum_lat / count as f64, sum_lon / count as f64))
}

/// Whether a coordinate pair is finite and inside the valid WGS84 range.
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Local east/north tangent plane anchored at an origin.
///
/// `x = Δlon·cos(lat₀)·111320`, `y = Δlat·111320`. Area error stays below 1%
/// while the latitude spread of the projected set is under ~10° and the extent
/// stays at survey scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalFrame {
    pub origin_lat: f64,
    pub origin_lon: f64,
    meters_per_deg_lon: f64,
}

impl LocalFrame {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        let meters_per_deg_lon = (origin_lat.to_radians().cos().abs() * METERS_PER_DEG).max(1e-6);
        Self {
            origin_lat,
            origin_lon,
            meters_per_deg_lon,
        }
    }

    /// Frame anchored at the mean of the given (lat, lon) pairs.
    pub fn centered_on<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        mean_lat_lon(points).map(|(lat, lon)| Self::new(lat, lon))
    }

    /// Project lat/lon to local (x east, y north) meters.
    pub fn to_local(&self, lat: f64, lon: f64) -> (f64, f64) {
        (
            (lon - self.origin_lon) * self.meters_per_deg_lon,
            (lat - self.origin_lat) * METERS_PER_DEG,
        )
    }

    /// Inverse projection, returning (lat, lon).
    pub fn to_geographic(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.origin_lat + y / METERS_PER_DEG,
            self.origin_lon + x / self.meters_per_deg_lon,
        )
    }
}

//! WGS84 reference ellipsoid: geodetic <-> ECEF conversion

use crate::types::{GeodeticPosition, Point3};

/// WGS84 semi-major axis (m)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 inverse flattening
pub const WGS84_INV_FLATTENING: f64 = 298.257_223_563;
/// WGS84 semi-minor axis (m)
pub const WGS84_B: f64 = WGS84_A * (1.0 - 1.0 / WGS84_INV_FLATTENING);
/// WGS84 first eccentricity squared
pub const WGS84_E2: f64 = (2.0 - 1.0 / WGS84_INV_FLATTENING) / WGS84_INV_FLATTENING;
/// WGS84 second eccentricity squared
pub const WGS84_EP2: f64 = WGS84_E2 / (1.0 - WGS84_E2);

/// Convert geodetic latitude/longitude (degrees) and ellipsoid height (m) to ECEF
pub fn geodetic_to_xyz(position: &GeodeticPosition) -> Point3 {
    let lat = position.latitude.to_radians();
    let lon = position.longitude.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // Prime vertical radius of curvature
    let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    Point3::new(
        (n + position.height) * cos_lat * cos_lon,
        (n + position.height) * cos_lat * sin_lon,
        (n * (1.0 - WGS84_E2) + position.height) * sin_lat,
    )
}

/// Convert ECEF to geodetic coordinates using Bowring's method
///
/// One Bowring step is accurate to well below a millimetre for points within
/// a few tens of kilometres of the ellipsoid surface.
pub fn xyz_to_geodetic(xyz: &Point3) -> GeodeticPosition {
    let p = (xyz.x * xyz.x + xyz.y * xyz.y).sqrt();
    let lon = xyz.y.atan2(xyz.x);

    let theta = (xyz.z * WGS84_A).atan2(p * WGS84_B);
    let (sin_theta, cos_theta) = theta.sin_cos();

    let lat = (xyz.z + WGS84_EP2 * WGS84_B * sin_theta.powi(3))
        .atan2(p - WGS84_E2 * WGS84_A * cos_theta.powi(3));
    let (sin_lat, cos_lat) = lat.sin_cos();

    // Stable at the poles as well as the equator
    let height = p * cos_lat + xyz.z * sin_lat
        - WGS84_A * (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    GeodeticPosition::new(lat.to_degrees(), lon.to_degrees(), height)
}

/// Residual of the ellipsoid inflated by `height`: zero when `p` lies on it
pub fn ellipsoid_equation(p: &Point3, height: f64) -> f64 {
    let a = WGS84_A + height;
    let b = WGS84_B + height;
    (p.x * p.x + p.y * p.y) / (a * a) + (p.z * p.z) / (b * b) - 1.0
}

/// Gradient of [`ellipsoid_equation`] with respect to `p`
pub fn ellipsoid_gradient(p: &Point3, height: f64) -> Point3 {
    let a2 = (WGS84_A + height).powi(2);
    let b2 = (WGS84_B + height).powi(2);
    Point3::new(2.0 * p.x / a2, 2.0 * p.y / a2, 2.0 * p.z / b2)
}

//! Synthetic acquisition used by the unit tests: a polar circular orbit at
//! 700 km altitude in the x-z plane crossing the equator at `T0`, imaging an
//! equatorial point 5 degrees east at the scene centre.

use crate::core::ellipsoid::WGS84_A;
use crate::core::geolocation::Geolocator;
use crate::core::orbit::OrbitModel;
use crate::core::sensor::{SensorTimingModel, SensorTimingModelBuilder};
use crate::types::{GeodeticPosition, OrbitStateVector, Point3, ProcessingWindow, SPEED_OF_LIGHT};

pub const RADIUS: f64 = WGS84_A + 700_000.0;
pub const PERIOD: f64 = 5_940.0;
pub const T0: f64 = 43_200.0;
pub const LINE_RATE: f64 = 1_700.0;
pub const RSR2X: f64 = 2.0 * 64.0e6;

pub fn omega() -> f64 {
    2.0 * std::f64::consts::PI / PERIOD
}

/// `count` state vectors `spacing` seconds apart, centred on T0
pub fn circular_state_vectors(count: usize, spacing: f64) -> Vec<OrbitStateVector> {
    let start = T0 - spacing * (count / 2) as f64;
    (0..count)
        .map(|i| {
            let t = start + i as f64 * spacing;
            let angle = omega() * (t - T0);
            OrbitStateVector::new(t, RADIUS * angle.cos(), 0.0, RADIUS * angle.sin())
        })
        .collect()
}

/// Five vectors 10 s apart fitted with a cubic
pub fn circular_orbit() -> OrbitModel {
    OrbitModel::fit(&circular_state_vectors(5, 10.0), 3).unwrap()
}

pub fn satellite_at_t0() -> Point3 {
    Point3::new(RADIUS, 0.0, 0.0)
}

/// Equatorial ground point 5 degrees east, right of the northbound track
pub fn ground_truth() -> Point3 {
    let lon = 5.0_f64.to_radians();
    Point3::new(WGS84_A * lon.cos(), WGS84_A * lon.sin(), 0.0)
}

/// Sensor whose scene centre (line 1001, pixel 500) images the ground truth
pub fn sensor_builder() -> SensorTimingModelBuilder {
    let slant_range = ground_truth().distance(&satellite_at_t0());
    SensorTimingModel::builder()
        .prf(LINE_RATE)
        .line_time_interval(1.0 / LINE_RATE)
        .azimuth_time_first_line(T0 - 1000.0 / LINE_RATE)
        .range_time_first_pixel(slant_range / SPEED_OF_LIGHT - 500.0 / RSR2X)
        .range_sampling_rate_2x(RSR2X)
        .window(ProcessingWindow::new(1, 2001, 0, 1000))
        .scene_centre(GeodeticPosition::new(0.0, 5.3, 0.0))
}

pub fn geolocator() -> Geolocator {
    Geolocator::new(circular_orbit(), sensor_builder().build().unwrap())
}

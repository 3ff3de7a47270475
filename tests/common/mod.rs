//! Acquisition built from a synthetic EOF file, shared by the integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use sargeo::{Geolocator, OrbitEphemeris, OrbitReader, ProcessingWindow, SensorTimingModel};
use tempfile::TempDir;

/// Seconds of day of the first state vector
pub const ORBIT_START: f64 = 43_200.0;
pub const VECTOR_COUNT: usize = 30;
pub const VECTOR_INTERVAL: f64 = 10.0;

/// Seconds of day of the first image line
pub const FIRST_LINE_TIME: f64 = 43_330.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write a mock precise orbit file and read it back
pub fn mock_ephemeris() -> (TempDir, OrbitEphemeris) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("S1A_OPER_AUX_POEORB_MOCK.EOF");
    let start = Utc.with_ymd_and_hms(2020, 1, 3, 12, 0, 0).unwrap();

    OrbitReader::create_mock_orbit_file(start, VECTOR_COUNT, VECTOR_INTERVAL, &path)
        .expect("Failed to write mock orbit file");
    let ephemeris = OrbitReader::read_orbit_file(&path).expect("Failed to read mock orbit file");
    (dir, ephemeris)
}

pub fn sensor() -> SensorTimingModel {
    SensorTimingModel::builder()
        .azimuth_time_first_line(FIRST_LINE_TIME)
        .window(ProcessingWindow::new(1, 2000, 0, 2000))
        .build()
        .expect("Invalid sensor parameters")
}

/// Degree-5 orbit through the vectors around the image, no scene centre metadata
pub fn scene() -> Geolocator {
    let (_dir, ephemeris) = mock_ephemeris();
    let sensor = sensor();
    let t_first = sensor.line_to_azimuth_time(1.0);
    let t_last = sensor.line_to_azimuth_time(2000.0);

    let orbit = ephemeris
        .select_around(t_first, t_last, 4)
        .and_then(|subset| subset.fit(5))
        .expect("Failed to fit orbit");
    Geolocator::new(orbit, sensor)
}

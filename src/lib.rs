//! sargeo: Orbit Modeling and Range-Doppler Geolocation for SAR
//!
//! Fits polynomial orbits to satellite state vectors and converts between
//! radar image coordinates (line, pixel) and terrain positions on the WGS84
//! ellipsoid by solving the range-Doppler equations.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types
pub use types::{
    GeodeticPosition, ImagePoint, OrbitStateVector, Point3, ProcessingWindow, RadarTimes,
    SarError, SarResult,
};
pub use crate::core::{
    DopplerCentroid, GeodeticSolver, GeolocationGrid, Geolocator, GridSpec, OrbitModel,
    SensorTimingModel, SensorTimingModelBuilder, SolverConfig,
};
pub use io::{OrbitEphemeris, OrbitReader};

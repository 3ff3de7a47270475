//! Orbit, timing and geolocation modules

pub mod ellipsoid;
pub mod orbit;
pub mod sensor;
pub mod geolocation;
pub mod geolocation_grid;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use orbit::{OrbitModel, Axis, DEFAULT_ORBIT_DEGREE};
pub use sensor::{SensorTimingModel, SensorTimingModelBuilder, DopplerCentroid};
pub use geolocation::{Geolocator, GeodeticSolver, SolverConfig};
pub use geolocation_grid::{GeolocationGrid, GridSpec};

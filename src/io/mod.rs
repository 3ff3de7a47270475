//! Orbit ephemeris input

pub mod orbit;

pub use orbit::{OrbitEphemeris, OrbitReader};

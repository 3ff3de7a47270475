use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Cartesian 3-vector: an ECEF point, or a satellite position/velocity/acceleration sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ZERO: Point3 = Point3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Point3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm_squared(&self) -> f64 {
        self.dot(self)
    }

    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    /// Euclidean distance between two points
    pub fn distance(&self, other: &Point3) -> f64 {
        (*self - *other).norm()
    }

    /// Largest absolute component (infinity norm)
    pub fn max_abs(&self) -> f64 {
        self.x.abs().max(self.y.abs()).max(self.z.abs())
    }

    pub fn cross(&self, other: &Point3) -> Point3 {
        Point3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Unit vector in the same direction
    pub fn normalized(&self) -> Point3 {
        *self / self.norm()
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(v: [f64; 3]) -> Self {
        Point3::new(v[0], v[1], v[2])
    }
}

impl Add for Point3 {
    type Output = Point3;
    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;
    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Point3;
    fn mul(self, rhs: f64) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Point3 {
    type Output = Point3;
    fn div(self, rhs: f64) -> Point3 {
        Point3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Point3 {
    type Output = Point3;
    fn neg(self) -> Point3 {
        Point3::new(-self.x, -self.y, -self.z)
    }
}

impl std::fmt::Display for Point3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:.3}, {:.3}, {:.3}]", self.x, self.y, self.z)
    }
}

/// Geodetic position on the WGS84 ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeodeticPosition {
    pub latitude: f64,  // degrees
    pub longitude: f64, // degrees
    pub height: f64,    // meters above the ellipsoid
}

impl GeodeticPosition {
    pub const fn new(latitude: f64, longitude: f64, height: f64) -> Self {
        Self { latitude, longitude, height }
    }
}

/// Radar image coordinates (1-based line, 0-based pixel as in the timing model)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePoint {
    pub line: f64,
    pub pixel: f64,
}

impl ImagePoint {
    pub const fn new(line: f64, pixel: f64) -> Self {
        Self { line, pixel }
    }
}

/// Zero-Doppler azimuth time and one-way range time of a target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarTimes {
    pub azimuth_time: f64, // seconds of day
    pub range_time: f64,   // seconds, one-way
}

/// One orbit ephemeris sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitStateVector {
    pub time: f64,                 // seconds of day
    pub position: Point3,          // meters, ECEF
    pub velocity: Option<Point3>,  // m/s, when the ephemeris source provides it
}

impl OrbitStateVector {
    pub fn new(time: f64, x: f64, y: f64, z: f64) -> Self {
        Self {
            time,
            position: Point3::new(x, y, z),
            velocity: None,
        }
    }
}

/// Image region a processing run is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingWindow {
    pub line_lo: u32,
    pub line_hi: u32,
    pub pixel_lo: u32,
    pub pixel_hi: u32,
}

impl ProcessingWindow {
    pub const fn new(line_lo: u32, line_hi: u32, pixel_lo: u32, pixel_hi: u32) -> Self {
        Self { line_lo, line_hi, pixel_lo, pixel_hi }
    }

    /// Number of lines; an inverted window holds a single line
    pub fn lines(&self) -> u32 {
        self.line_hi.saturating_sub(self.line_lo) + 1
    }

    /// Number of pixels; an inverted window holds a single pixel
    pub fn pixels(&self) -> u32 {
        self.pixel_hi.saturating_sub(self.pixel_lo) + 1
    }

    pub fn is_valid(&self) -> bool {
        self.line_lo <= self.line_hi && self.pixel_lo <= self.pixel_hi
    }
}

/// Last iterate of a Newton solver that hit its iteration cap
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LastIterate {
    /// Forward solver: target ECEF position
    Target(Point3),
    /// Inverse solver: azimuth time (seconds of day)
    AzimuthTime(f64),
}

impl std::fmt::Display for LastIterate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LastIterate::Target(_) => write!(f, "forward (line/pixel/height -> XYZ)"),
            LastIterate::AzimuthTime(_) => write!(f, "inverse (XYZ -> azimuth time)"),
        }
    }
}

/// Error types for orbit modeling and geolocation
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polynomial degree {degree} requires more than {num_state_vectors} state vectors")]
    InvalidDegree {
        degree: usize,
        num_state_vectors: usize,
    },

    #[error("Invalid state vectors: {0}")]
    InvalidStateVectors(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{last_iterate} solver did not converge after {iterations} iterations (last update {last_update:e})")]
    Divergence {
        iterations: usize,
        last_update: f64,
        last_iterate: LastIterate,
    },

    #[error("Singular system: {0}")]
    SingularSystem(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for SAR geometry operations
pub type SarResult<T> = Result<T, SarError>;

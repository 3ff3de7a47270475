use crate::core::ellipsoid::geodetic_to_xyz;
use crate::types::{
    GeodeticPosition, ImagePoint, Point3, ProcessingWindow, SarError, SarResult, SPEED_OF_LIGHT,
};
use serde::{Deserialize, Serialize};

/// Share of |PRF - azimuth bandwidth| below which the Doppler centroid is treated as constant
pub const DEFAULT_DOPPLER_CONSTANT_FRACTION: f64 = 0.30;

/// Linear and quadratic Doppler terms below this magnitude are considered absent
pub const DOPPLER_COEFFICIENT_EPSILON: f64 = 1e-10;

/// Doppler centroid polynomial in two-way range time from the first pixel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DopplerCentroid {
    pub a0: f64, // Hz
    pub a1: f64, // Hz/s
    pub a2: f64, // Hz/s^2
}

impl DopplerCentroid {
    pub const fn new(a0: f64, a1: f64, a2: f64) -> Self {
        Self { a0, a1, a2 }
    }

    pub fn evaluate(&self, tau: f64) -> f64 {
        self.a0 + self.a1 * tau + self.a2 * tau * tau
    }

    fn has_range_dependence(&self) -> bool {
        self.a1.abs() >= DOPPLER_COEFFICIENT_EPSILON || self.a2.abs() >= DOPPLER_COEFFICIENT_EPSILON
    }
}

/// Sensor clock and image geometry: pixel <-> range time, line <-> azimuth time
///
/// Built once through [`SensorTimingModelBuilder`] and immutable afterwards, so a
/// single model can be shared by every tile worker. Use [`SensorTimingModel::to_builder`]
/// to derive a modified copy (e.g. another processing window).
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTimingModel {
    prf: f64,
    line_time_interval: f64,
    t_azi1: f64,
    t_range1: f64,
    rsr2x: f64,
    near_range_on_left: bool,
    window: ProcessingWindow,
    ml_azimuth: u32,
    ml_range: u32,
    azimuth_bandwidth: f64,
    range_bandwidth: f64,
    wavelength: f64,
    doppler: DopplerCentroid,
    doppler_constant_fraction: f64,
    scene_centre: Option<GeodeticPosition>,
    /// Collapsed Doppler value when the centroid is classified constant
    doppler_constant: Option<f64>,
}

impl SensorTimingModel {
    pub fn builder() -> SensorTimingModelBuilder {
        SensorTimingModelBuilder::default()
    }

    /// Builder seeded with this model's parameters
    pub fn to_builder(&self) -> SensorTimingModelBuilder {
        SensorTimingModelBuilder {
            prf: self.prf,
            line_time_interval: self.line_time_interval,
            azimuth_time_first_line: self.t_azi1,
            range_time_first_pixel: self.t_range1,
            range_sampling_rate_2x: self.rsr2x,
            near_range_on_left: self.near_range_on_left,
            window: self.window,
            ml_azimuth: self.ml_azimuth,
            ml_range: self.ml_range,
            azimuth_bandwidth: self.azimuth_bandwidth,
            range_bandwidth: self.range_bandwidth,
            wavelength: self.wavelength,
            doppler: self.doppler,
            doppler_constant_fraction: self.doppler_constant_fraction,
            scene_centre: self.scene_centre,
        }
    }

    /// One-way range time of a pixel
    pub fn pixel_to_range_time(&self, pixel: f64) -> f64 {
        if self.near_range_on_left {
            self.t_range1 + pixel / self.rsr2x
        } else {
            self.t_range1 + (self.window.pixel_hi as f64 - 1.0 - pixel) / self.rsr2x
        }
    }

    pub fn range_time_to_pixel(&self, range_time: f64) -> f64 {
        let offset = (range_time - self.t_range1) * self.rsr2x;
        if self.near_range_on_left {
            offset
        } else {
            self.window.pixel_hi as f64 - 1.0 - offset
        }
    }

    /// Azimuth time (seconds of day) of a 1-based line
    pub fn line_to_azimuth_time(&self, line: f64) -> f64 {
        self.t_azi1 + (line - 1.0) * self.line_time_interval
    }

    pub fn azimuth_time_to_line(&self, azimuth_time: f64) -> f64 {
        1.0 + (azimuth_time - self.t_azi1) / self.line_time_interval
    }

    pub fn pixel_to_slant_range(&self, pixel: f64) -> f64 {
        SPEED_OF_LIGHT * self.pixel_to_range_time(pixel)
    }

    pub fn slant_range_to_pixel(&self, slant_range: f64) -> f64 {
        self.range_time_to_pixel(slant_range / SPEED_OF_LIGHT)
    }

    /// Slant range spacing between neighbouring (multilooked) pixels (m)
    pub fn delta_slant_range(&self, pixel: f64) -> f64 {
        let step = self.pixel_to_slant_range(pixel + 1.0) - self.pixel_to_slant_range(pixel);
        self.ml_range as f64 * step.abs()
    }

    /// Doppler centroid frequency (Hz) at a pixel
    pub fn doppler_at(&self, pixel: f64) -> f64 {
        match self.doppler_constant {
            Some(value) => value,
            None => self.doppler_polynomial(pixel),
        }
    }

    pub fn is_doppler_constant(&self) -> bool {
        self.doppler_constant.is_some()
    }

    fn doppler_polynomial(&self, pixel: f64) -> f64 {
        // Two-way range time from the first pixel
        let tau = (pixel - 1.0) / (self.rsr2x / 2.0);
        self.doppler.evaluate(tau)
    }

    /// Spread of the modeled Doppler over the window: absolute deviations of the
    /// first, middle and last pixel (and the parabola vertex when it falls inside
    /// the window) from their mean
    pub fn doppler_spread(&self) -> f64 {
        let mut samples = vec![
            self.doppler_polynomial(self.window.pixel_lo as f64),
            self.doppler_polynomial(self.swath_mid_pixel()),
            self.doppler_polynomial(self.window.pixel_hi as f64),
        ];
        if let Some(pixel) = self.doppler_vertex_pixel() {
            samples.push(self.doppler_polynomial(pixel));
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        samples.iter().map(|f| (f - mean).abs()).sum()
    }

    /// Pixel of the Doppler parabola's extremum, if it lies inside the window
    fn doppler_vertex_pixel(&self) -> Option<f64> {
        if self.doppler.a2.abs() < DOPPLER_COEFFICIENT_EPSILON {
            return None;
        }
        let tau = -self.doppler.a1 / (2.0 * self.doppler.a2);
        let pixel = 1.0 + tau * (self.rsr2x / 2.0);
        let (lo, hi) = (self.window.pixel_lo as f64, self.window.pixel_hi as f64);
        (pixel > lo && pixel < hi).then_some(pixel)
    }

    /// Largest Doppler spread still treated as constant
    pub fn doppler_threshold(&self) -> f64 {
        (self.prf - self.azimuth_bandwidth).abs() * self.doppler_constant_fraction
    }

    fn swath_mid_pixel(&self) -> f64 {
        (self.window.pixel_lo as f64 + self.window.pixel_hi as f64) / 2.0
    }

    /// Centre of the processing window in image coordinates
    pub fn scene_centre(&self) -> ImagePoint {
        ImagePoint::new(
            (self.window.line_lo as f64 + self.window.line_hi as f64) / 2.0,
            self.swath_mid_pixel(),
        )
    }

    /// Approximate scene centre from the product metadata, as ECEF
    pub fn approx_scene_centre_xyz(&self) -> Option<Point3> {
        self.scene_centre.as_ref().map(geodetic_to_xyz)
    }

    pub fn prf(&self) -> f64 {
        self.prf
    }

    pub fn line_time_interval(&self) -> f64 {
        self.line_time_interval
    }

    pub fn azimuth_time_first_line(&self) -> f64 {
        self.t_azi1
    }

    pub fn range_time_first_pixel(&self) -> f64 {
        self.t_range1
    }

    pub fn range_sampling_rate_2x(&self) -> f64 {
        self.rsr2x
    }

    pub fn near_range_on_left(&self) -> bool {
        self.near_range_on_left
    }

    pub fn window(&self) -> ProcessingWindow {
        self.window
    }

    pub fn ml_azimuth(&self) -> u32 {
        self.ml_azimuth
    }

    pub fn ml_range(&self) -> u32 {
        self.ml_range
    }

    pub fn azimuth_bandwidth(&self) -> f64 {
        self.azimuth_bandwidth
    }

    pub fn range_bandwidth(&self) -> f64 {
        self.range_bandwidth
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn doppler(&self) -> DopplerCentroid {
        self.doppler
    }

    pub fn scene_centre_geodetic(&self) -> Option<GeodeticPosition> {
        self.scene_centre
    }
}

/// Sensor scalar metadata collected before a processing run
///
/// Defaults describe a Sentinel-1 IW sub-swath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorTimingModelBuilder {
    pub prf: f64,
    pub line_time_interval: f64,
    pub azimuth_time_first_line: f64,
    pub range_time_first_pixel: f64,
    pub range_sampling_rate_2x: f64,
    pub near_range_on_left: bool,
    pub window: ProcessingWindow,
    pub ml_azimuth: u32,
    pub ml_range: u32,
    pub azimuth_bandwidth: f64,
    pub range_bandwidth: f64,
    pub wavelength: f64,
    pub doppler: DopplerCentroid,
    pub doppler_constant_fraction: f64,
    pub scene_centre: Option<GeodeticPosition>,
}

impl Default for SensorTimingModelBuilder {
    fn default() -> Self {
        Self {
            prf: 486.486,
            line_time_interval: 2.055_556e-3,
            azimuth_time_first_line: 0.0,
            range_time_first_pixel: 2.72e-3,      // one-way, ~815 km slant range
            range_sampling_rate_2x: 2.0 * 64.345_238e6,
            near_range_on_left: true,
            window: ProcessingWindow::new(1, 1500, 0, 20_000),
            ml_azimuth: 1,
            ml_range: 1,
            azimuth_bandwidth: 327.0,
            range_bandwidth: 56.5e6,
            wavelength: 0.055_465_76,             // C-band
            doppler: DopplerCentroid::default(),
            doppler_constant_fraction: DEFAULT_DOPPLER_CONSTANT_FRACTION,
            scene_centre: None,
        }
    }
}

impl SensorTimingModelBuilder {
    pub fn prf(mut self, prf: f64) -> Self {
        self.prf = prf;
        self
    }

    pub fn line_time_interval(mut self, seconds: f64) -> Self {
        self.line_time_interval = seconds;
        self
    }

    pub fn azimuth_time_first_line(mut self, seconds_of_day: f64) -> Self {
        self.azimuth_time_first_line = seconds_of_day;
        self
    }

    pub fn range_time_first_pixel(mut self, seconds: f64) -> Self {
        self.range_time_first_pixel = seconds;
        self
    }

    pub fn range_sampling_rate_2x(mut self, hz: f64) -> Self {
        self.range_sampling_rate_2x = hz;
        self
    }

    pub fn near_range_on_left(mut self, flag: bool) -> Self {
        self.near_range_on_left = flag;
        self
    }

    pub fn window(mut self, window: ProcessingWindow) -> Self {
        self.window = window;
        self
    }

    pub fn multilook(mut self, ml_azimuth: u32, ml_range: u32) -> Self {
        self.ml_azimuth = ml_azimuth;
        self.ml_range = ml_range;
        self
    }

    pub fn azimuth_bandwidth(mut self, hz: f64) -> Self {
        self.azimuth_bandwidth = hz;
        self
    }

    pub fn range_bandwidth(mut self, hz: f64) -> Self {
        self.range_bandwidth = hz;
        self
    }

    pub fn wavelength(mut self, meters: f64) -> Self {
        self.wavelength = meters;
        self
    }

    pub fn doppler(mut self, doppler: DopplerCentroid) -> Self {
        self.doppler = doppler;
        self
    }

    pub fn doppler_constant_fraction(mut self, fraction: f64) -> Self {
        self.doppler_constant_fraction = fraction;
        self
    }

    pub fn scene_centre(mut self, centre: GeodeticPosition) -> Self {
        self.scene_centre = Some(centre);
        self
    }

    /// Validate the parameters and classify the Doppler centroid
    pub fn build(self) -> SarResult<SensorTimingModel> {
        let positive = [
            ("PRF", self.prf),
            ("line time interval", self.line_time_interval),
            ("range sampling rate", self.range_sampling_rate_2x),
            ("azimuth bandwidth", self.azimuth_bandwidth),
            ("range bandwidth", self.range_bandwidth),
            ("wavelength", self.wavelength),
        ];
        for (name, value) in positive.iter() {
            if !(value.is_finite() && *value > 0.0) {
                return Err(SarError::InvalidParameter(format!(
                    "{} must be positive, got {}", name, value
                )));
            }
        }
        if !self.window.is_valid() {
            return Err(SarError::InvalidParameter(format!(
                "Processing window bounds inverted: {:?}", self.window
            )));
        }
        if self.ml_azimuth == 0 || self.ml_range == 0 {
            return Err(SarError::InvalidParameter(
                "Multilook factors must be at least 1".to_string(),
            ));
        }
        if !(self.doppler_constant_fraction >= 0.0) {
            return Err(SarError::InvalidParameter(format!(
                "Doppler constant fraction must be non-negative, got {}",
                self.doppler_constant_fraction
            )));
        }

        let mut model = SensorTimingModel {
            prf: self.prf,
            line_time_interval: self.line_time_interval,
            t_azi1: self.azimuth_time_first_line,
            t_range1: self.range_time_first_pixel,
            rsr2x: self.range_sampling_rate_2x,
            near_range_on_left: self.near_range_on_left,
            window: self.window,
            ml_azimuth: self.ml_azimuth,
            ml_range: self.ml_range,
            azimuth_bandwidth: self.azimuth_bandwidth,
            range_bandwidth: self.range_bandwidth,
            wavelength: self.wavelength,
            doppler: self.doppler,
            doppler_constant_fraction: self.doppler_constant_fraction,
            scene_centre: self.scene_centre,
            doppler_constant: None,
        };

        let spread = model.doppler_spread();
        let threshold = model.doppler_threshold();
        if !model.doppler.has_range_dependence() || spread < threshold {
            let value = model.doppler_polynomial(model.swath_mid_pixel());
            log::debug!(
                "Doppler centroid treated as constant {:.3} Hz (spread {:.3} Hz < {:.3} Hz)",
                value, spread, threshold
            );
            model.doppler_constant = Some(value);
        } else {
            log::debug!(
                "Doppler centroid varies over swath (spread {:.3} Hz >= {:.3} Hz)",
                spread, threshold
            );
        }

        Ok(model)
    }
}

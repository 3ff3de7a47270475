use crate::core::ellipsoid::xyz_to_geodetic;
use crate::core::geolocation::Geolocator;
use crate::types::{GeodeticPosition, Point3, SarError, SarResult};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Sub-sampling of the processing window at which tie points are computed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Lines between grid rows
    pub line_step: u32,
    /// Pixels between grid columns
    pub pixel_step: u32,
    /// Terrain height above the ellipsoid (m)
    pub height: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            line_step: 100,
            pixel_step: 100,
            height: 0.0,
        }
    }
}

/// Geodetic tie-point grid over the processing window
///
/// Nodes where the forward solver fails hold NaN and are counted in
/// `failed_points`.
#[derive(Debug, Clone)]
pub struct GeolocationGrid {
    lines: Vec<f64>,
    pixels: Vec<f64>,
    latitude: Array2<f64>,
    longitude: Array2<f64>,
    incidence_angle: Array2<f64>,
    height: f64,
    failed_points: usize,
}

impl GeolocationGrid {
    /// Geolocate every grid node of the geolocator's processing window
    pub fn compute(geolocator: &Geolocator, spec: &GridSpec) -> SarResult<Self> {
        if spec.line_step == 0 || spec.pixel_step == 0 {
            return Err(SarError::InvalidParameter(format!(
                "Grid steps must be positive (line_step={}, pixel_step={})",
                spec.line_step, spec.pixel_step
            )));
        }

        let window = geolocator.sensor().window();
        let lines = grid_axis(window.line_lo, window.line_hi, spec.line_step);
        let pixels = grid_axis(window.pixel_lo, window.pixel_hi, spec.pixel_step);
        let shape = (lines.len(), pixels.len());

        log::info!(
            "Computing {}x{} geolocation grid (steps {}x{}, height {:.1} m)",
            shape.0, shape.1, spec.line_step, spec.pixel_step, spec.height
        );

        let mut latitude = Array2::from_elem(shape, f64::NAN);
        let mut longitude = Array2::from_elem(shape, f64::NAN);
        let mut incidence_angle = Array2::from_elem(shape, f64::NAN);

        let geolocate_node = |(i, j): (usize, usize), lat: &mut f64, lon: &mut f64, inc: &mut f64| {
            let (line, pixel) = (lines[i], pixels[j]);
            match geolocator.lph2xyz(line, pixel, spec.height) {
                Ok(target) => {
                    let position = xyz_to_geodetic(&target);
                    let azimuth_time = geolocator.sensor().line_to_azimuth_time(line);
                    let satellite = geolocator.orbit().position(azimuth_time);
                    *lat = position.latitude;
                    *lon = position.longitude;
                    *inc = incidence_angle_deg(&position, &target, &satellite);
                }
                Err(e) => {
                    log::debug!("Grid node (line {}, pixel {}) failed: {}", line, pixel, e);
                }
            }
        };

        let zip = Zip::indexed(&mut latitude)
            .and(&mut longitude)
            .and(&mut incidence_angle);

        #[cfg(feature = "parallel")]
        zip.par_for_each(geolocate_node);
        #[cfg(not(feature = "parallel"))]
        zip.for_each(geolocate_node);

        let failed_points = latitude.iter().filter(|v| v.is_nan()).count();
        if failed_points > 0 {
            log::warn!(
                "{} of {} grid nodes failed to geolocate",
                failed_points,
                latitude.len()
            );
        }

        Ok(Self {
            lines,
            pixels,
            latitude,
            longitude,
            incidence_angle,
            height: spec.height,
            failed_points,
        })
    }

    /// Line coordinate of each grid row
    pub fn lines(&self) -> &[f64] {
        &self.lines
    }

    /// Pixel coordinate of each grid column
    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    pub fn latitude(&self) -> &Array2<f64> {
        &self.latitude
    }

    pub fn longitude(&self) -> &Array2<f64> {
        &self.longitude
    }

    /// Ellipsoid incidence angle at each node (degrees)
    pub fn incidence_angle(&self) -> &Array2<f64> {
        &self.incidence_angle
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn failed_points(&self) -> usize {
        self.failed_points
    }

    pub fn shape(&self) -> (usize, usize) {
        self.latitude.dim()
    }

    /// Bilinear interpolation of the grid at an image position
    ///
    /// Returns `None` outside the grid or when a surrounding node failed.
    pub fn interpolate(&self, line: f64, pixel: f64) -> Option<GeodeticPosition> {
        let (i1, i2, dy) = locate(&self.lines, line)?;
        let (j1, j2, dx) = locate(&self.pixels, pixel)?;

        let corners = [(i1, j1), (i1, j2), (i2, j1), (i2, j2)];
        let lat = corners.map(|idx| self.latitude[idx]);
        let mut lon = corners.map(|idx| self.longitude[idx]);
        if lat.iter().chain(lon.iter()).any(|v| v.is_nan()) {
            return None;
        }

        // Keep the cell on one side of the antimeridian
        let lon_min = lon.iter().cloned().fold(f64::INFINITY, f64::min);
        let lon_max = lon.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if lon_max - lon_min > 180.0 {
            for v in lon.iter_mut() {
                if *v < 0.0 {
                    *v += 360.0;
                }
            }
        }

        let weights = [
            (1.0 - dy) * (1.0 - dx),
            (1.0 - dy) * dx,
            dy * (1.0 - dx),
            dy * dx,
        ];
        let blend = |v: &[f64; 4]| v.iter().zip(weights.iter()).map(|(a, w)| a * w).sum::<f64>();

        let mut longitude = blend(&lon);
        if longitude > 180.0 {
            longitude -= 360.0;
        }

        Some(GeodeticPosition::new(blend(&lat), longitude, self.height))
    }
}

/// Axis from `lo` in `step` increments, always ending on `hi`
fn grid_axis(lo: u32, hi: u32, step: u32) -> Vec<f64> {
    let mut axis: Vec<f64> = (lo..hi).step_by(step as usize).map(|v| v as f64).collect();
    axis.push(hi as f64);
    axis
}

/// Bracketing indices and fractional offset of `value` on a sorted axis
fn locate(axis: &[f64], value: f64) -> Option<(usize, usize, f64)> {
    let first = *axis.first()?;
    let last = *axis.last()?;
    if !(value >= first && value <= last) {
        return None;
    }
    if axis.len() == 1 {
        return Some((0, 0, 0.0));
    }

    let upper = axis.partition_point(|&v| v <= value).clamp(1, axis.len() - 1);
    let lower = upper - 1;
    let fraction = (value - axis[lower]) / (axis[upper] - axis[lower]);
    Some((lower, upper, fraction))
}

/// Angle between the ellipsoid normal at the target and the line of sight to the satellite
fn incidence_angle_deg(position: &GeodeticPosition, target: &Point3, satellite: &Point3) -> f64 {
    let (lat, lon) = (position.latitude.to_radians(), position.longitude.to_radians());
    let normal = Point3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin());
    let look = (*satellite - *target).normalized();
    normal.dot(&look).clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ellipsoid::WGS84_A;
    use crate::core::geolocation::SolverConfig;
    use crate::core::testing::*;
    use approx::assert_abs_diff_eq;

    fn grid_spec() -> GridSpec {
        GridSpec {
            line_step: 500,
            pixel_step: 250,
            height: 0.0,
        }
    }

    #[test]
    fn test_grid_axis_includes_last() {
        assert_eq!(grid_axis(1, 2001, 500), vec![1.0, 501.0, 1001.0, 1501.0, 2001.0]);
        assert_eq!(grid_axis(0, 10, 4), vec![0.0, 4.0, 8.0, 10.0]);
        assert_eq!(grid_axis(3, 3, 10), vec![3.0]);
    }

    #[test]
    fn test_grid_centre_node() {
        let geo = geolocator();
        let grid = GeolocationGrid::compute(&geo, &grid_spec()).unwrap();

        assert_eq!(grid.shape(), (5, 5));
        assert_eq!(grid.failed_points(), 0);
        assert_eq!(grid.lines()[2], 1001.0);
        assert_eq!(grid.pixels()[2], 500.0);

        assert_abs_diff_eq!(grid.latitude()[[2, 2]], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(grid.longitude()[[2, 2]], 5.0, epsilon = 1e-4);

        let lon = 5.0_f64.to_radians();
        let slant_range = ground_truth().distance(&satellite_at_t0());
        let expected = ((RADIUS * lon.cos() - WGS84_A) / slant_range).acos().to_degrees();
        assert_abs_diff_eq!(grid.incidence_angle()[[2, 2]], expected, epsilon = 1e-3);
    }

    #[test]
    fn test_incidence_grows_with_range() {
        let geo = geolocator();
        let grid = GeolocationGrid::compute(&geo, &grid_spec()).unwrap();
        let row = grid.incidence_angle().row(2);
        for j in 1..row.len() {
            assert!(row[j] > row[j - 1]);
        }
    }

    #[test]
    fn test_interpolation() {
        let geo = geolocator();
        let grid = GeolocationGrid::compute(&geo, &grid_spec()).unwrap();

        let node = grid.interpolate(1501.0, 750.0).unwrap();
        assert_eq!(node.latitude, grid.latitude()[[3, 3]]);
        assert_eq!(node.longitude, grid.longitude()[[3, 3]]);

        let interpolated = grid.interpolate(1250.0, 625.0).unwrap();
        let exact = geo.lp2ell(1250.0, 625.0).unwrap();
        assert_abs_diff_eq!(interpolated.latitude, exact.latitude, epsilon = 1e-4);
        assert_abs_diff_eq!(interpolated.longitude, exact.longitude, epsilon = 1e-4);

        assert!(grid.interpolate(0.5, 500.0).is_none());
        assert!(grid.interpolate(1000.0, 1000.5).is_none());
    }

    #[test]
    fn test_failed_nodes_are_nan() {
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let geo = Geolocator::with_config(circular_orbit(), sensor_builder().build().unwrap(), config);
        let grid = GeolocationGrid::compute(&geo, &grid_spec()).unwrap();

        assert_eq!(grid.failed_points(), 25);
        assert!(grid.latitude().iter().all(|v| v.is_nan()));
        assert!(grid.interpolate(1001.0, 500.0).is_none());
    }

    #[test]
    fn test_grid_spec_serde_round_trip() {
        let spec = GridSpec {
            line_step: 250,
            pixel_step: 40,
            height: 812.5,
        };
        let xml = quick_xml::se::to_string(&spec).unwrap();
        let restored: GridSpec = quick_xml::de::from_str(&xml).unwrap();
        assert_eq!(restored, spec);
    }

    #[test]
    fn test_zero_step_rejected() {
        let geo = geolocator();
        let spec = GridSpec {
            pixel_step: 0,
            ..GridSpec::default()
        };
        assert!(matches!(
            GeolocationGrid::compute(&geo, &spec),
            Err(SarError::InvalidParameter(_))
        ));
    }
}

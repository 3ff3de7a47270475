use crate::core::ellipsoid::{
    ellipsoid_equation, ellipsoid_gradient, geodetic_to_xyz, xyz_to_geodetic, WGS84_A,
};
use crate::core::orbit::OrbitModel;
use crate::core::sensor::SensorTimingModel;
use crate::types::{
    GeodeticPosition, ImagePoint, LastIterate, Point3, RadarTimes, SarError, SarResult,
    SPEED_OF_LIGHT,
};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Iteration limits and tolerances of the range-Doppler solvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Iteration cap shared by the forward and inverse solvers
    pub max_iterations: usize,
    /// Forward solver stops when every component of the update is below this (m)
    pub forward_tolerance: f64,
    /// Inverse solver stops when the azimuth time update is below this (s)
    pub inverse_tolerance: f64,
    /// Inverse solver returns an error instead of its last iterate on non-convergence
    pub strict_convergence: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            forward_tolerance: 1e-6,
            inverse_tolerance: 1e-10,
            strict_convergence: true,
        }
    }
}

/// Forward and inverse range-Doppler geolocation
///
/// Implemented by [`Geolocator`]; exists so consumers can substitute a
/// simplified geometry in their own tests.
pub trait GeodeticSolver {
    /// Target ECEF position seen at `azimuth_time` and one-way `range_time`,
    /// lying `height` metres above the ellipsoid
    fn lph2xyz_at(
        &self,
        azimuth_time: f64,
        range_time: f64,
        height: f64,
        initial_guess: Point3,
    ) -> SarResult<Point3>;

    /// Zero-Doppler azimuth time and range time of an ECEF target
    fn xyz2t(&self, target: &Point3, initial_azimuth_time: f64) -> SarResult<RadarTimes>;
}

/// Zero-Doppler condition: projection of the line of sight on the satellite velocity
pub fn doppler_equation(sat_velocity: &Point3, sat_position: &Point3, target: &Point3) -> f64 {
    sat_velocity.dot(&(*target - *sat_position))
}

/// Time derivative of [`doppler_equation`] for a fixed target
pub fn doppler_equation_rate(
    sat_velocity: &Point3,
    sat_acceleration: &Point3,
    sat_position: &Point3,
    target: &Point3,
) -> f64 {
    sat_acceleration.dot(&(*target - *sat_position)) - sat_velocity.norm_squared()
}

/// Range condition: squared distance minus the squared slant range of `range_time`
pub fn range_equation(sat_position: &Point3, target: &Point3, range_time: f64) -> f64 {
    let slant_range = SPEED_OF_LIGHT * range_time;
    (*target - *sat_position).norm_squared() - slant_range * slant_range
}

/// Orbit and sensor timing composed into image <-> terrain conversions
///
/// Immutable once built; share one instance between worker threads.
#[derive(Debug, Clone)]
pub struct Geolocator {
    orbit: OrbitModel,
    sensor: SensorTimingModel,
    config: SolverConfig,
}

impl Geolocator {
    pub fn new(orbit: OrbitModel, sensor: SensorTimingModel) -> Self {
        Self::with_config(orbit, sensor, SolverConfig::default())
    }

    pub fn with_config(orbit: OrbitModel, sensor: SensorTimingModel, config: SolverConfig) -> Self {
        let (first, last) = orbit.time_span();
        let line_lo = sensor.line_to_azimuth_time(sensor.window().line_lo as f64);
        let line_hi = sensor.line_to_azimuth_time(sensor.window().line_hi as f64);
        if line_lo.min(line_hi) < first || line_lo.max(line_hi) > last {
            log::warn!(
                "Image azimuth times [{:.3}, {:.3}] extend beyond the orbit span [{:.3}, {:.3}]",
                line_lo.min(line_hi), line_lo.max(line_hi), first, last
            );
        }
        Self { orbit, sensor, config }
    }

    pub fn orbit(&self) -> &OrbitModel {
        &self.orbit
    }

    pub fn sensor(&self) -> &SensorTimingModel {
        &self.sensor
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Newton-Raphson on the Doppler / range / ellipsoid system
    pub fn lph2xyz_at(
        &self,
        azimuth_time: f64,
        range_time: f64,
        height: f64,
        initial_guess: Point3,
    ) -> SarResult<Point3> {
        // Satellite state is fixed by the azimuth time
        let sat_position = self.orbit.position(azimuth_time);
        let sat_velocity = self.orbit.velocity(azimuth_time);

        let mut target = initial_guess;
        let mut last_update = f64::INFINITY;

        for iteration in 0..self.config.max_iterations {
            let line_of_sight = target - sat_position;
            let gradient = ellipsoid_gradient(&target, height);

            let mut jacobian = Matrix3::new(
                sat_velocity.x, sat_velocity.y, sat_velocity.z,
                2.0 * line_of_sight.x, 2.0 * line_of_sight.y, 2.0 * line_of_sight.z,
                gradient.x, gradient.y, gradient.z,
            );
            let mut residual = Vector3::new(
                doppler_equation(&sat_velocity, &sat_position, &target),
                range_equation(&sat_position, &target, range_time),
                ellipsoid_equation(&target, height),
            );

            // Rows differ by ~13 orders of magnitude; equilibrate before factorizing
            for row in 0..3 {
                let scale = jacobian.row(row).norm();
                if scale > 0.0 {
                    jacobian.row_mut(row).unscale_mut(scale);
                    residual[row] /= scale;
                }
            }

            let delta = jacobian.lu().solve(&(-residual)).ok_or_else(|| {
                SarError::SingularSystem(format!(
                    "Range-Doppler Jacobian singular at iterate {}",
                    target
                ))
            })?;
            let delta = Point3::new(delta[0], delta[1], delta[2]);

            target = target + delta;
            last_update = delta.max_abs();

            log::trace!(
                "lph2xyz iteration {}: update {:.3e} m, target {}",
                iteration + 1, last_update, target
            );

            if last_update < self.config.forward_tolerance {
                return Ok(target);
            }
        }

        Err(SarError::Divergence {
            iterations: self.config.max_iterations,
            last_update,
            last_iterate: LastIterate::Target(target),
        })
    }

    /// Terrain position of an image point at `height` above the ellipsoid
    pub fn lph2xyz(&self, line: f64, pixel: f64, height: f64) -> SarResult<Point3> {
        let azimuth_time = self.sensor.line_to_azimuth_time(line);
        let range_time = self.sensor.pixel_to_range_time(pixel);
        let guess = self.initial_guess(azimuth_time, range_time, height);
        self.lph2xyz_at(azimuth_time, range_time, height, guess)
    }

    /// Terrain position of an image point on the ellipsoid
    pub fn lp2xyz(&self, line: f64, pixel: f64) -> SarResult<Point3> {
        self.lph2xyz(line, pixel, 0.0)
    }

    pub fn lph2ell(&self, line: f64, pixel: f64, height: f64) -> SarResult<GeodeticPosition> {
        Ok(xyz_to_geodetic(&self.lph2xyz(line, pixel, height)?))
    }

    pub fn lp2ell(&self, line: f64, pixel: f64) -> SarResult<GeodeticPosition> {
        self.lph2ell(line, pixel, 0.0)
    }

    /// Starting point of the forward solver: the metadata scene centre when known,
    /// otherwise a point offset from nadir towards the right-looking side
    fn initial_guess(&self, azimuth_time: f64, range_time: f64, height: f64) -> Point3 {
        if let Some(centre) = self.sensor.approx_scene_centre_xyz() {
            return centre;
        }

        let sat_position = self.orbit.position(azimuth_time);
        let sat_velocity = self.orbit.velocity(azimuth_time);
        let up = sat_position.normalized();
        let right = sat_velocity.cross(&up).normalized();

        let earth_radius = WGS84_A + height;
        let altitude = sat_position.norm() - earth_radius;
        let slant_range = SPEED_OF_LIGHT * range_time;
        let ground_offset = (slant_range * slant_range - altitude * altitude).max(0.0).sqrt();

        let guess = up * earth_radius + right * ground_offset;
        guess * (earth_radius / guess.norm())
    }

    /// 1-D Newton iteration on the zero-Doppler azimuth time
    pub fn xyz2t(&self, target: &Point3, initial_azimuth_time: f64) -> SarResult<RadarTimes> {
        let mut azimuth_time = initial_azimuth_time;
        let mut last_update = f64::INFINITY;
        let mut converged = false;

        for iteration in 0..self.config.max_iterations {
            let (position, velocity, acceleration) =
                self.orbit.position_velocity_acceleration(azimuth_time);

            let f = doppler_equation(&velocity, &position, target);
            let df = doppler_equation_rate(&velocity, &acceleration, &position, target);
            if df == 0.0 || !df.is_finite() {
                return Err(SarError::SingularSystem(format!(
                    "Zero-Doppler derivative vanished at t = {:.6}",
                    azimuth_time
                )));
            }

            let update = f / df;
            azimuth_time -= update;
            last_update = update.abs();

            log::trace!(
                "xyz2t iteration {}: update {:.3e} s, t = {:.9}",
                iteration + 1, last_update, azimuth_time
            );

            if last_update < self.config.inverse_tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            if self.config.strict_convergence {
                return Err(SarError::Divergence {
                    iterations: self.config.max_iterations,
                    last_update,
                    last_iterate: LastIterate::AzimuthTime(azimuth_time),
                });
            }
            log::warn!(
                "xyz2t did not converge after {} iterations (last update {:.3e} s); using last iterate",
                self.config.max_iterations, last_update
            );
        }

        let range_time = self.orbit.position(azimuth_time).distance(target) / SPEED_OF_LIGHT;
        Ok(RadarTimes { azimuth_time, range_time })
    }

    /// [`Geolocator::xyz2t`] seeded with the azimuth time of the scene centre
    pub fn xyz2t_default(&self, target: &Point3) -> SarResult<RadarTimes> {
        let centre_time = self.sensor.line_to_azimuth_time(self.sensor.scene_centre().line);
        self.xyz2t(target, centre_time)
    }

    /// Image coordinates of an ECEF target
    pub fn xyz2lp(&self, target: &Point3) -> SarResult<ImagePoint> {
        let times = self.xyz2t_default(target)?;
        Ok(ImagePoint::new(
            self.sensor.azimuth_time_to_line(times.azimuth_time),
            self.sensor.range_time_to_pixel(times.range_time),
        ))
    }

    /// Image coordinates of a geodetic position
    pub fn ell2lp(&self, position: &GeodeticPosition) -> SarResult<ImagePoint> {
        self.xyz2lp(&geodetic_to_xyz(position))
    }

    /// Satellite position at the target's zero-Doppler time
    pub fn xyz2orb(&self, target: &Point3) -> SarResult<Point3> {
        let times = self.xyz2t_default(target)?;
        Ok(self.orbit.position(times.azimuth_time))
    }

    /// Distance flown by the satellite between consecutive (multilooked) lines (m)
    pub fn azimuth_spacing(&self, line: f64) -> f64 {
        let t = self.sensor.line_to_azimuth_time(line);
        let step = self.orbit.position(t).distance(&self.orbit.position(t + self.sensor.line_time_interval()));
        self.sensor.ml_azimuth() as f64 * step
    }

    /// Azimuth resolution at a line (m)
    pub fn azimuth_resolution(&self, line: f64) -> f64 {
        (self.sensor.prf() / self.sensor.azimuth_bandwidth())
            * (self.azimuth_spacing(line) / self.sensor.ml_azimuth() as f64)
    }

    /// Slant range spacing at a pixel (m)
    pub fn range_spacing(&self, pixel: f64) -> f64 {
        self.sensor.delta_slant_range(pixel)
    }

    /// Slant range resolution at a pixel (m)
    pub fn range_resolution(&self, pixel: f64) -> f64 {
        let oversampling = (self.sensor.range_sampling_rate_2x() / 2.0) / self.sensor.range_bandwidth();
        oversampling * (self.sensor.delta_slant_range(pixel) / self.sensor.ml_range() as f64)
    }
}

impl GeodeticSolver for Geolocator {
    fn lph2xyz_at(
        &self,
        azimuth_time: f64,
        range_time: f64,
        height: f64,
        initial_guess: Point3,
    ) -> SarResult<Point3> {
        Geolocator::lph2xyz_at(self, azimuth_time, range_time, height, initial_guess)
    }

    fn xyz2t(&self, target: &Point3, initial_azimuth_time: f64) -> SarResult<RadarTimes> {
        Geolocator::xyz2t(self, target, initial_azimuth_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn orbit() -> OrbitModel {
        circular_orbit()
    }

    #[test]
    fn test_forward_converges_to_ground_truth() {
        let geo = geolocator();
        let target = geo.lp2xyz(1001.0, 500.0).unwrap();
        let error = target.distance(&ground_truth());
        assert!(error < 1.0, "scene centre error {:.3} m", error);
    }

    #[test]
    fn test_forward_without_scene_centre_metadata() {
        let mut builder = sensor_builder();
        builder.scene_centre = None;
        let geo = Geolocator::new(orbit(), builder.build().unwrap());

        let target = geo.lp2xyz(1001.0, 500.0).unwrap();
        assert!(target.distance(&ground_truth()) < 1.0);
    }

    #[test]
    fn test_forward_satisfies_equations() {
        let geo = geolocator();
        let line = 1400.0;
        let pixel = 120.0;
        let height = 350.0;
        let target = geo.lph2xyz(line, pixel, height).unwrap();

        let t = geo.sensor().line_to_azimuth_time(line);
        let rt = geo.sensor().pixel_to_range_time(pixel);
        let sat = geo.orbit().position(t);
        let vel = geo.orbit().velocity(t);

        // Doppler residual scaled to a distance along track
        assert_abs_diff_eq!(doppler_equation(&vel, &sat, &target) / vel.norm(), 0.0, epsilon = 1e-5);
        assert_relative_eq!(target.distance(&sat), SPEED_OF_LIGHT * rt, max_relative = 1e-12);
        assert_abs_diff_eq!(ellipsoid_equation(&target, height), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_forward_divergence_is_reported() {
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let geo = Geolocator::with_config(orbit(), sensor_builder().build().unwrap(), config);

        match geo.lp2xyz(1001.0, 500.0) {
            Err(SarError::Divergence { iterations, last_update, last_iterate }) => {
                assert_eq!(iterations, 1);
                assert!(last_update >= 1e-6);
                assert!(matches!(last_iterate, LastIterate::Target(_)));
            }
            other => panic!("expected divergence, got {:?}", other),
        }
    }

    #[test]
    fn test_inverse_recovers_zero_doppler_time() {
        let geo = geolocator();
        let truth = ground_truth();
        let times = geo.xyz2t(&truth, T0 + 0.3).unwrap();

        assert_abs_diff_eq!(times.azimuth_time, T0, epsilon = 1e-6);
        let expected_range = truth.distance(&satellite_at_t0());
        assert_abs_diff_eq!(times.range_time * SPEED_OF_LIGHT, expected_range, epsilon = 0.05);
    }

    #[test]
    fn test_inverse_strict_and_soft_modes() {
        let strict = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let soft = SolverConfig {
            strict_convergence: false,
            ..strict.clone()
        };

        let geo = Geolocator::with_config(orbit(), sensor_builder().build().unwrap(), strict);
        assert!(matches!(
            geo.xyz2t(&ground_truth(), T0 + 0.5),
            Err(SarError::Divergence { last_iterate: LastIterate::AzimuthTime(_), .. })
        ));

        let geo = Geolocator::with_config(orbit(), sensor_builder().build().unwrap(), soft);
        let times = geo.xyz2t(&ground_truth(), T0 + 0.5).unwrap();
        // One Newton step already lands close to the zero-Doppler time
        assert_abs_diff_eq!(times.azimuth_time, T0, epsilon = 1e-3);
    }

    #[test]
    fn test_image_round_trip() {
        let geo = geolocator();
        for &(line, pixel) in &[(1.0, 0.0), (1001.0, 500.0), (250.5, 875.25), (2001.0, 1000.0)] {
            let target = geo.lp2xyz(line, pixel).unwrap();
            let back = geo.xyz2lp(&target).unwrap();
            assert_abs_diff_eq!(back.line, line, epsilon = 1e-3);
            assert_abs_diff_eq!(back.pixel, pixel, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_geodetic_round_trip() {
        let geo = geolocator();
        let position = geo.lp2ell(800.0, 300.0).unwrap();
        assert_abs_diff_eq!(position.height, 0.0, epsilon = 1e-3);

        let back = geo.ell2lp(&position).unwrap();
        assert_abs_diff_eq!(back.line, 800.0, epsilon = 1e-3);
        assert_abs_diff_eq!(back.pixel, 300.0, epsilon = 1e-3);
    }

    #[test]
    fn test_xyz2orb_returns_satellite_at_zero_doppler() {
        let geo = geolocator();
        let sat = geo.xyz2orb(&ground_truth()).unwrap();
        assert!(sat.distance(&satellite_at_t0()) < 0.05);
    }

    #[test]
    fn test_resolution_and_spacing() {
        let geo = Geolocator::new(
            orbit(),
            sensor_builder()
                .multilook(2, 3)
                .azimuth_bandwidth(1_400.0)
                .range_bandwidth(50.0e6)
                .build()
                .unwrap(),
        );

        let speed = omega() * RADIUS;
        let along_track = speed / LINE_RATE;
        assert_relative_eq!(geo.azimuth_spacing(1001.0), 2.0 * along_track, max_relative = 1e-6);
        assert_relative_eq!(
            geo.azimuth_resolution(1001.0),
            (LINE_RATE / 1_400.0) * along_track,
            max_relative = 1e-6
        );

        let range_step = SPEED_OF_LIGHT / RSR2X;
        assert_relative_eq!(geo.range_spacing(10.0), 3.0 * range_step, max_relative = 1e-6);
        assert_relative_eq!(
            geo.range_resolution(10.0),
            (64.0e6 / 50.0e6) * range_step,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_solver_trait_object() {
        let geo = geolocator();
        let solver: &dyn GeodeticSolver = &geo;
        let rt = geo.sensor().pixel_to_range_time(500.0);
        let target = solver
            .lph2xyz_at(T0, rt, 0.0, geodetic_to_xyz(&GeodeticPosition::new(0.0, 5.3, 0.0)))
            .unwrap();
        let times = solver.xyz2t(&target, T0 + 0.1).unwrap();
        assert_abs_diff_eq!(times.azimuth_time, T0, epsilon = 1e-8);
        assert_relative_eq!(times.range_time, rt, max_relative = 1e-12);
    }

    #[test]
    fn test_forward_singular_jacobian() {
        // The ellipsoid gradient vanishes at the Earth's centre
        let geo = geolocator();
        let rt = geo.sensor().pixel_to_range_time(500.0);
        match geo.lph2xyz_at(T0, rt, 0.0, Point3::ZERO) {
            Err(SarError::SingularSystem(msg)) => assert!(msg.contains("Jacobian")),
            other => panic!("expected singular system, got {:?}", other),
        }
    }

    #[test]
    fn test_inverse_zero_doppler_rate() {
        // A degree-0 orbit is stationary: velocity and acceleration are exactly zero
        let stationary = OrbitModel::fit(&circular_state_vectors(1, 10.0), 0).unwrap();
        let geo = Geolocator::new(stationary, sensor_builder().build().unwrap());

        assert!(matches!(
            geo.xyz2t(&ground_truth(), T0),
            Err(SarError::SingularSystem(_))
        ));
        assert!(matches!(geo.xyz2lp(&ground_truth()), Err(SarError::SingularSystem(_))));
    }

    #[test]
    fn test_solver_config_serde_round_trip() {
        let config = SolverConfig {
            max_iterations: 25,
            forward_tolerance: 1e-4,
            inverse_tolerance: 1e-9,
            strict_convergence: false,
        };
        let xml = quick_xml::se::to_string(&config).unwrap();
        let restored: SolverConfig = quick_xml::de::from_str(&xml).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_geolocator_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Geolocator>();
    }
}

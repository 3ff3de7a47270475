use crate::types::{OrbitStateVector, Point3, SarError, SarResult};
use nalgebra::DMatrix;

/// Polynomial degree used when the caller does not choose one
pub const DEFAULT_ORBIT_DEGREE: usize = 3;

/// Time normalization: polynomials are fitted in (t - t_mid) / 10
const TIME_SCALE: f64 = 10.0;

/// Fit residual above which the orbit polynomial is reported as suspicious (m)
const RESIDUAL_WARNING_THRESHOLD: f64 = 1.0;

/// Satellite trajectory fitted as one polynomial per ECEF axis
///
/// The model is a pure curve fit of the ephemeris: evaluating it outside the
/// span of the fitted state vectors is numerically possible but not accurate.
#[derive(Debug, Clone)]
pub struct OrbitModel {
    times: Vec<f64>,
    positions: Vec<Point3>,
    coeff_x: Vec<f64>,
    coeff_y: Vec<f64>,
    coeff_z: Vec<f64>,
    degree: usize,
    /// Time of the middle state vector, origin of the normalized time
    t_mid: f64,
}

/// ECEF axis selector for coefficient access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl OrbitModel {
    /// Least-squares fit of degree-`degree` polynomials to the state vector positions
    pub fn fit(state_vectors: &[OrbitStateVector], degree: usize) -> SarResult<Self> {
        let n = state_vectors.len();
        if n == 0 {
            return Err(SarError::InvalidStateVectors(
                "No state vectors to fit".to_string(),
            ));
        }
        if degree >= n {
            return Err(SarError::InvalidDegree {
                degree,
                num_state_vectors: n,
            });
        }
        for pair in state_vectors.windows(2) {
            if pair[1].time <= pair[0].time {
                return Err(SarError::InvalidStateVectors(format!(
                    "State vector times must be strictly increasing ({:.6} followed by {:.6})",
                    pair[0].time, pair[1].time
                )));
            }
        }

        let times: Vec<f64> = state_vectors.iter().map(|sv| sv.time).collect();
        let positions: Vec<Point3> = state_vectors.iter().map(|sv| sv.position).collect();
        let t_mid = times[n / 2];

        // Vandermonde design matrix in normalized time, one right-hand side per axis
        let design = DMatrix::from_fn(n, degree + 1, |row, col| {
            ((times[row] - t_mid) / TIME_SCALE).powi(col as i32)
        });
        let observations = DMatrix::from_fn(n, 3, |row, col| positions[row].to_array()[col]);

        let svd = design.svd(true, true);
        let solution = svd
            .solve(&observations, 1e-12)
            .map_err(|e| SarError::Processing(format!("Orbit polynomial fit failed: {}", e)))?;

        let column = |c: usize| -> Vec<f64> { (0..=degree).map(|i| solution[(i, c)]).collect() };

        let model = Self {
            coeff_x: column(0),
            coeff_y: column(1),
            coeff_z: column(2),
            times,
            positions,
            degree,
            t_mid,
        };

        log::info!(
            "Fitted degree-{} orbit polynomial to {} state vectors ({:.1} s span)",
            degree,
            n,
            model.times[n - 1] - model.times[0]
        );

        let residuals = model.fit_residuals();
        log::debug!("Orbit fit max residuals (m): {}", residuals);
        if residuals.max_abs() > RESIDUAL_WARNING_THRESHOLD {
            log::warn!(
                "Orbit polynomial residual {:.3} m exceeds {:.1} m; consider another degree",
                residuals.max_abs(),
                RESIDUAL_WARNING_THRESHOLD
            );
        }

        Ok(model)
    }

    /// Fit with [`DEFAULT_ORBIT_DEGREE`], lowered when too few state vectors are given
    pub fn fit_default(state_vectors: &[OrbitStateVector]) -> SarResult<Self> {
        let degree = DEFAULT_ORBIT_DEGREE.min(state_vectors.len().saturating_sub(1));
        Self::fit(state_vectors, degree)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn num_state_vectors(&self) -> usize {
        self.times.len()
    }

    /// First and last state vector time
    pub fn time_span(&self) -> (f64, f64) {
        (self.times[0], self.times[self.times.len() - 1])
    }

    pub fn reference_time(&self) -> f64 {
        self.t_mid
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn positions(&self) -> &[Point3] {
        &self.positions
    }

    /// Coefficients of one axis in ascending power of normalized time
    pub fn coefficients(&self, axis: Axis) -> &[f64] {
        match axis {
            Axis::X => &self.coeff_x,
            Axis::Y => &self.coeff_y,
            Axis::Z => &self.coeff_z,
        }
    }

    #[inline]
    fn coefficient(&self, i: usize) -> Point3 {
        Point3::new(self.coeff_x[i], self.coeff_y[i], self.coeff_z[i])
    }

    #[inline]
    fn normalize(&self, t: f64) -> f64 {
        (t - self.t_mid) / TIME_SCALE
    }

    /// Position, velocity and acceleration from a single Horner pass
    pub fn position_velocity_acceleration(&self, t: f64) -> (Point3, Point3, Point3) {
        let tn = self.normalize(t);

        let mut pos = self.coefficient(self.degree);
        let mut vel = Point3::ZERO;
        let mut acc = Point3::ZERO;

        for i in (0..self.degree).rev() {
            acc = acc * tn + vel * 2.0;
            vel = vel * tn + pos;
            pos = pos * tn + self.coefficient(i);
        }

        // Chain rule for tn = (t - t_mid) / 10
        (pos, vel / TIME_SCALE, acc / (TIME_SCALE * TIME_SCALE))
    }

    /// Satellite position (m)
    pub fn position(&self, t: f64) -> Point3 {
        let tn = self.normalize(t);
        let mut pos = self.coefficient(self.degree);
        for i in (0..self.degree).rev() {
            pos = pos * tn + self.coefficient(i);
        }
        pos
    }

    /// Satellite velocity (m/s)
    pub fn velocity(&self, t: f64) -> Point3 {
        if self.degree == 0 {
            return Point3::ZERO;
        }
        let tn = self.normalize(t);
        let mut vel = self.coefficient(self.degree) * self.degree as f64;
        for i in (1..self.degree).rev() {
            vel = vel * tn + self.coefficient(i) * i as f64;
        }
        vel / TIME_SCALE
    }

    /// Satellite acceleration (m/s^2)
    pub fn acceleration(&self, t: f64) -> Point3 {
        if self.degree < 2 {
            return Point3::ZERO;
        }
        let tn = self.normalize(t);
        let d = self.degree;
        let mut acc = self.coefficient(d) * (d * (d - 1)) as f64;
        for i in (2..d).rev() {
            acc = acc * tn + self.coefficient(i) * (i * (i - 1)) as f64;
        }
        acc / (TIME_SCALE * TIME_SCALE)
    }

    /// Largest absolute misfit per axis at the fitted state vectors
    pub fn fit_residuals(&self) -> Point3 {
        self.times
            .iter()
            .zip(self.positions.iter())
            .fold(Point3::ZERO, |worst, (&t, &observed)| {
                let diff = self.position(t) - observed;
                Point3::new(
                    worst.x.max(diff.x.abs()),
                    worst.y.max(diff.y.abs()),
                    worst.z.max(diff.z.abs()),
                )
            })
    }
}

use crate::core::orbit::OrbitModel;
use crate::types::{OrbitStateVector, Point3, SarError, SarResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Root of an ESA Earth Explorer orbit file
#[derive(Debug, Deserialize)]
struct EarthExplorerFile {
    #[serde(rename = "Data_Block")]
    data_block: DataBlock,
}

#[derive(Debug, Deserialize)]
struct DataBlock {
    #[serde(rename = "List_of_OSVs")]
    list_of_osvs: ListOfOsvs,
}

#[derive(Debug, Deserialize)]
struct ListOfOsvs {
    #[serde(rename = "OSV", default)]
    osvs: Vec<Osv>,
}

#[derive(Debug, Deserialize)]
struct Osv {
    #[serde(rename = "UTC")]
    utc: String,
    #[serde(rename = "X")]
    x: Measured,
    #[serde(rename = "Y")]
    y: Measured,
    #[serde(rename = "Z")]
    z: Measured,
    #[serde(rename = "VX")]
    vx: Option<Measured>,
    #[serde(rename = "VY")]
    vy: Option<Measured>,
    #[serde(rename = "VZ")]
    vz: Option<Measured>,
}

/// Element carrying a `unit` attribute around a numeric value
#[derive(Debug, Deserialize)]
struct Measured {
    #[serde(rename = "$text")]
    value: f64,
}

/// State vectors read from an orbit file, timed in seconds of day
///
/// Times are relative to midnight of `reference_date`, the UTC date of the
/// first vector; vectors on later days run past 86400 s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitEphemeris {
    pub reference_date: NaiveDate,
    pub state_vectors: Vec<OrbitStateVector>,
}

impl OrbitEphemeris {
    pub fn len(&self) -> usize {
        self.state_vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state_vectors.is_empty()
    }

    /// Time span covered by the ephemeris (seconds of day)
    pub fn time_span(&self) -> Option<(f64, f64)> {
        Some((self.state_vectors.first()?.time, self.state_vectors.last()?.time))
    }

    /// Seconds elapsed between midnight of the reference date and `time`
    pub fn seconds_of_day(&self, time: DateTime<Utc>) -> SarResult<f64> {
        seconds_since_midnight(self.reference_date, time.naive_utc())
    }

    /// Vectors covering `[t_start, t_stop]` plus `extra` vectors on each side
    pub fn select_around(&self, t_start: f64, t_stop: f64, extra: usize) -> SarResult<OrbitEphemeris> {
        if !(t_start <= t_stop) {
            return Err(SarError::InvalidParameter(format!(
                "Selection start {:.3} is after stop {:.3}",
                t_start, t_stop
            )));
        }
        let (first, last) = self.time_span().ok_or_else(|| {
            SarError::Processing("Orbit ephemeris holds no state vectors".to_string())
        })?;
        if t_stop < first || t_start > last {
            return Err(SarError::Processing(format!(
                "Interval [{:.3}, {:.3}] lies outside the orbit span [{:.3}, {:.3}]",
                t_start, t_stop, first, last
            )));
        }
        if t_start < first || t_stop > last {
            log::warn!(
                "Interval [{:.3}, {:.3}] only partially covered by the orbit span [{:.3}, {:.3}]",
                t_start, t_stop, first, last
            );
        }

        let svs = &self.state_vectors;
        let lo = svs.partition_point(|sv| sv.time <= t_start).saturating_sub(1);
        let hi = svs.partition_point(|sv| sv.time < t_stop).min(svs.len() - 1);
        let lo = lo.saturating_sub(extra);
        let hi = (hi + extra).min(svs.len() - 1);

        log::debug!(
            "Selected state vectors {}..={} of {} for [{:.3}, {:.3}]",
            lo, hi, svs.len(), t_start, t_stop
        );

        Ok(OrbitEphemeris {
            reference_date: self.reference_date,
            state_vectors: svs[lo..=hi].to_vec(),
        })
    }

    /// Least-squares polynomial orbit through all vectors
    pub fn fit(&self, degree: usize) -> SarResult<OrbitModel> {
        OrbitModel::fit(&self.state_vectors, degree)
    }
}

/// Precise orbit file reader for Sentinel-1
pub struct OrbitReader;

impl OrbitReader {
    /// Read precise orbit file (EOF format)
    pub fn read_orbit_file<P: AsRef<Path>>(path: P) -> SarResult<OrbitEphemeris> {
        log::info!("Reading orbit file: {}", path.as_ref().display());

        let content = fs::read_to_string(&path)?;
        Self::parse_eof(&content)
    }

    /// Parse the XML content of an EOF file
    pub fn parse_eof(content: &str) -> SarResult<OrbitEphemeris> {
        log::info!("Parsing EOF orbit file ({} bytes)", content.len());

        let file: EarthExplorerFile = from_str(content)
            .map_err(|e| SarError::XmlParsing(format!("Invalid EOF document: {}", e)))?;

        let mut epochs = file
            .data_block
            .list_of_osvs
            .osvs
            .into_iter()
            .map(|osv| Ok((parse_utc(&osv.utc)?, osv)))
            .collect::<SarResult<Vec<_>>>()?;

        if epochs.is_empty() {
            return Err(SarError::InvalidStateVectors(
                "No state vectors found in orbit file".to_string(),
            ));
        }

        epochs.sort_by_key(|(epoch, _)| *epoch);
        let before = epochs.len();
        epochs.dedup_by_key(|(epoch, _)| *epoch);
        if epochs.len() < before {
            log::debug!("Dropped {} duplicate state vector epochs", before - epochs.len());
        }

        let reference_date = epochs[0].0.date();
        let state_vectors = epochs
            .into_iter()
            .map(|(epoch, osv)| {
                let velocity = match (osv.vx, osv.vy, osv.vz) {
                    (Some(vx), Some(vy), Some(vz)) => Some(Point3::new(vx.value, vy.value, vz.value)),
                    _ => None,
                };
                Ok(OrbitStateVector {
                    time: seconds_since_midnight(reference_date, epoch)?,
                    position: Point3::new(osv.x.value, osv.y.value, osv.z.value),
                    velocity,
                })
            })
            .collect::<SarResult<Vec<_>>>()?;

        Self::validate_orbit_data(&state_vectors);
        log::info!(
            "Parsed {} state vectors starting {}",
            state_vectors.len(),
            reference_date
        );

        Ok(OrbitEphemeris {
            reference_date,
            state_vectors,
        })
    }

    /// Create a circular-orbit EOF file for testing
    pub fn create_mock_orbit_file(
        start_time: DateTime<Utc>,
        count: usize,
        interval: f64,
        output_path: &Path,
    ) -> SarResult<()> {
        log::info!("Creating mock orbit file: {}", output_path.display());

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Sentinel-1 orbital parameters (approximate)
        let orbit_period = 5940.0;
        let orbit_radius = 7_070_000.0;
        let inclination = 98.18_f64.to_radians();
        let orbital_velocity = 2.0 * std::f64::consts::PI * orbit_radius / orbit_period;

        let mut content = String::new();
        content.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        content.push_str("<Earth_Explorer_File>\n");
        content.push_str("  <Earth_Explorer_Header>\n");
        content.push_str("    <Fixed_Header>\n");
        content.push_str("      <File_Type>AUX_POEORB</File_Type>\n");
        content.push_str("    </Fixed_Header>\n");
        content.push_str("  </Earth_Explorer_Header>\n");
        content.push_str("  <Data_Block type=\"xml\">\n");
        content.push_str(&format!("    <List_of_OSVs count=\"{}\">\n", count));

        for i in 0..count {
            let time_offset = i as f64 * interval;
            let epoch = start_time + chrono::Duration::microseconds((time_offset * 1e6).round() as i64);
            let stamp = epoch.format("%Y-%m-%dT%H:%M:%S.%6f");

            let angle = (time_offset / orbit_period) * 2.0 * std::f64::consts::PI;
            // Orbital plane rotated about the x-axis by the inclination
            let x = orbit_radius * angle.cos();
            let y = orbit_radius * angle.sin() * inclination.cos();
            let z = orbit_radius * angle.sin() * inclination.sin();
            let vx = -orbital_velocity * angle.sin();
            let vy = orbital_velocity * angle.cos() * inclination.cos();
            let vz = orbital_velocity * angle.cos() * inclination.sin();

            content.push_str("      <OSV>\n");
            content.push_str(&format!("        <TAI>TAI={}</TAI>\n", stamp));
            content.push_str(&format!("        <UTC>UTC={}</UTC>\n", stamp));
            content.push_str(&format!("        <UT1>UT1={}</UT1>\n", stamp));
            content.push_str(&format!("        <Absolute_Orbit>+{}</Absolute_Orbit>\n", 30000 + i));
            content.push_str(&format!("        <X unit=\"m\">{:.6}</X>\n", x));
            content.push_str(&format!("        <Y unit=\"m\">{:.6}</Y>\n", y));
            content.push_str(&format!("        <Z unit=\"m\">{:.6}</Z>\n", z));
            content.push_str(&format!("        <VX unit=\"m/s\">{:.6}</VX>\n", vx));
            content.push_str(&format!("        <VY unit=\"m/s\">{:.6}</VY>\n", vy));
            content.push_str(&format!("        <VZ unit=\"m/s\">{:.6}</VZ>\n", vz));
            content.push_str("        <Quality>NOMINAL</Quality>\n");
            content.push_str("      </OSV>\n");
        }

        content.push_str("    </List_of_OSVs>\n");
        content.push_str("  </Data_Block>\n");
        content.push_str("</Earth_Explorer_File>\n");

        fs::write(output_path, content)?;
        log::info!("Mock orbit file created with {} state vectors", count);
        Ok(())
    }

    /// Warn about vectors with implausible LEO speed or radius
    fn validate_orbit_data(state_vectors: &[OrbitStateVector]) {
        for sv in state_vectors {
            if let Some(velocity) = sv.velocity {
                let speed = velocity.norm();
                if !(6000.0..=9000.0).contains(&speed) {
                    log::warn!("Unusual orbital velocity: {:.1} m/s at t = {:.3}", speed, sv.time);
                }
            }

            let radius = sv.position.norm();
            if !(6_500_000.0..=7_500_000.0).contains(&radius) {
                log::warn!("Unusual orbital radius: {:.1} km at t = {:.3}", radius / 1000.0, sv.time);
            }
        }
    }
}

/// `UTC=2020-01-03T17:00:00.000000` (prefix optional)
fn parse_utc(raw: &str) -> SarResult<NaiveDateTime> {
    let raw = raw.trim();
    let stamp = raw.strip_prefix("UTC=").unwrap_or(raw);
    NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| SarError::XmlParsing(format!("Invalid UTC time '{}': {}", raw, e)))
}

fn seconds_since_midnight(date: NaiveDate, time: NaiveDateTime) -> SarResult<f64> {
    let elapsed = time - date.and_time(NaiveTime::MIN);
    elapsed
        .num_microseconds()
        .map(|us| us as f64 / 1e6)
        .ok_or_else(|| SarError::Processing(format!("Time {} too far from {}", time, date)))
}

use std::fs;
use std::path::{Path, PathBuf};

use crate::alignment::StreamAligner;
use crate::error::{Result, RoadTrackerError};
use crate::smoothing::GpsInterpolator;
use crate::types::{RawAccelSample, RawGpsFix, UnifiedSample, UserId};

/// Parse an accelerometer CSV row: `x,y,z` (integers)
pub fn parse_accel_row(line: &str) -> Result<RawAccelSample> {
    let fields = split_fields(line, 3)?;
    let parse = |s: &str| {
        s.parse::<i32>().map_err(|e| {
            RoadTrackerError::MalformedInput(format!("accelerometer '{}': {}", line, e))
        })
    };
    Ok(RawAccelSample::new(
        parse(fields[0])?,
        parse(fields[1])?,
        parse(fields[2])?,
    ))
}

/// Parse a GPS CSV row: `longitude,latitude`
pub fn parse_gps_row(line: &str) -> Result<RawGpsFix> {
    let fields = split_fields(line, 2)?;
    let parse = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RoadTrackerError::MalformedInput(format!("gps '{}'", line)))
    };
    Ok(RawGpsFix::new(parse(fields[0])?, parse(fields[1])?))
}

fn split_fields(line: &str, expected: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
    if fields.len() != expected || fields.iter().any(|f| f.is_empty()) {
        return Err(RoadTrackerError::MalformedInput(format!(
            "expected {} fields, got '{}'",
            expected,
            line.trim()
        )));
    }
    Ok(fields)
}

/// Data rows of a CSV file (header skipped)
fn data_lines(content: &str) -> impl Iterator<Item = &str> {
    content.lines().skip(1)
}

/// Reads recorded accelerometer and GPS CSV files and replays the aligned
/// samples, wrapping around at the end of the recording.
pub struct FileDatasource {
    accelerometer_path: PathBuf,
    gps_path: PathBuf,
    user_id: UserId,
    smooth_step: usize,
    data: Vec<UnifiedSample>,
    position: usize,
    skipped_rows: u64,
}

impl FileDatasource {
    pub fn new(
        accelerometer_path: impl AsRef<Path>,
        gps_path: impl AsRef<Path>,
        user_id: UserId,
        smooth_step: usize,
    ) -> Self {
        FileDatasource {
            accelerometer_path: accelerometer_path.as_ref().to_path_buf(),
            gps_path: gps_path.as_ref().to_path_buf(),
            user_id,
            smooth_step,
            data: Vec::new(),
            position: 0,
            skipped_rows: 0,
        }
    }

    /// Load both files and align them into the replay buffer.
    /// Returns the number of aligned samples.
    pub fn start_reading(&mut self) -> Result<usize> {
        self.position = 0;
        self.data.clear();
        self.skipped_rows = 0;

        let accel_content = fs::read_to_string(&self.accelerometer_path)?;
        let gps_content = fs::read_to_string(&self.gps_path)?;

        let mut bad_gps = 0u64;
        let fixes = data_lines(&gps_content).filter_map(|line| match parse_gps_row(line) {
            Ok(fix) => Some(fix),
            Err(e) => {
                log::debug!("Skipping GPS row: {}", e);
                bad_gps += 1;
                None
            }
        });
        let accel_rows = data_lines(&accel_content).map(parse_accel_row);

        let mut aligner = StreamAligner::new(
            self.user_id,
            accel_rows,
            GpsInterpolator::with_step(fixes, self.smooth_step),
        );
        self.data.extend(aligner.by_ref());
        let skipped_accel = aligner.skipped();
        drop(aligner);

        self.skipped_rows = skipped_accel + bad_gps;
        log::info!(
            "Loaded {} aligned samples from {:?} + {:?} ({} rows skipped)",
            self.data.len(),
            self.accelerometer_path,
            self.gps_path,
            self.skipped_rows
        );
        Ok(self.data.len())
    }

    /// Next sample, wrapping to the start once the recording is exhausted
    pub fn read(&mut self) -> Option<UnifiedSample> {
        if self.data.is_empty() {
            return None;
        }
        if self.position == self.data.len() {
            self.position = 0;
        }
        let sample = self.data[self.position].clone();
        self.position += 1;
        Some(sample)
    }

    pub fn stop_reading(&mut self) {
        self.data.clear();
        self.position = 0;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn skipped_rows(&self) -> u64 {
        self.skipped_rows
    }
}

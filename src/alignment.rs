use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{RawAccelSample, RawGpsFix, UnifiedSample, UserId};

/// Zips accelerometer rows against the densified GPS sequence.
///
/// Stops as soon as either side runs out, so the output length is
/// `min(accel rows, interpolated fixes)`. The GPS track is expanded by the
/// interpolation step while the accelerometer is not, which makes this a lossy
/// alignment for heterogeneously-sampled inputs. Malformed accelerometer rows
/// consume their GPS partner and emit nothing.
pub struct StreamAligner<A, G> {
    accel: A,
    gps: G,
    user_id: UserId,
    clock: fn() -> DateTime<Utc>,
    emitted: u64,
    skipped: u64,
}

impl<A, G> StreamAligner<A, G>
where
    A: Iterator<Item = Result<RawAccelSample>>,
    G: Iterator<Item = RawGpsFix>,
{
    pub fn new(user_id: UserId, accel: A, gps: G) -> Self {
        Self::with_clock(user_id, accel, gps, Utc::now)
    }

    pub fn with_clock(user_id: UserId, accel: A, gps: G, clock: fn() -> DateTime<Utc>) -> Self {
        StreamAligner {
            accel,
            gps,
            user_id,
            clock,
            emitted: 0,
            skipped: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Rows consumed without producing a sample
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<A, G> Iterator for StreamAligner<A, G>
where
    A: Iterator<Item = Result<RawAccelSample>>,
    G: Iterator<Item = RawGpsFix>,
{
    type Item = UnifiedSample;

    fn next(&mut self) -> Option<UnifiedSample> {
        loop {
            let accel = self.accel.next()?;
            let gps = self.gps.next()?;

            match accel {
                Ok(accelerometer) => {
                    self.emitted += 1;
                    return Some(UnifiedSample {
                        user_id: self.user_id,
                        accelerometer,
                        gps,
                        timestamp: (self.clock)(),
                    });
                }
                Err(e) => {
                    log::debug!("Skipping accelerometer row: {}", e);
                    self.skipped += 1;
                }
            }
        }
    }
}

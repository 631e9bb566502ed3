use crate::types::RawGpsFix;

/// Default number of output points per GPS pair (first raw fix + 4 interpolated)
pub const DEFAULT_SMOOTH_STEP: usize = 5;

/// Densifies a GPS track by linear interpolation.
///
/// Fixes are consumed in non-overlapping pairs `(1,2), (3,4), ...`. Each pair
/// yields its first fix followed by `step - 1` points interpolated towards the
/// second fix; the second fix itself is never emitted. A trailing unpaired fix
/// is emitted raw.
///
/// The interpolator owns its input and is single-pass: once consumed it cannot
/// be restarted.
pub struct GpsInterpolator<I> {
    input: I,
    step: usize,
    /// Current pair and the next interpolation index to emit (1..step)
    segment: Option<(RawGpsFix, RawGpsFix, usize)>,
    done: bool,
}

impl<I> GpsInterpolator<I>
where
    I: Iterator<Item = RawGpsFix>,
{
    pub fn new(input: I) -> Self {
        Self::with_step(input, DEFAULT_SMOOTH_STEP)
    }

    pub fn with_step(input: I, step: usize) -> Self {
        GpsInterpolator {
            input,
            step,
            segment: None,
            done: false,
        }
    }
}

impl<I> Iterator for GpsInterpolator<I>
where
    I: Iterator<Item = RawGpsFix>,
{
    type Item = RawGpsFix;

    fn next(&mut self) -> Option<RawGpsFix> {
        if self.done {
            return None;
        }

        if let Some((p1, p2, i)) = self.segment.take() {
            if i < self.step {
                self.segment = Some((p1, p2, i + 1));
                return Some(p1.interpolate(&p2, i, self.step));
            }
        }

        let p1 = match self.input.next() {
            Some(fix) => fix,
            None => {
                self.done = true;
                return None;
            }
        };

        match self.input.next() {
            Some(p2) => self.segment = Some((p1, p2, 1)),
            // Unpaired trailing fix: emit raw, then stop
            None => self.done = true,
        }

        Some(p1)
    }
}

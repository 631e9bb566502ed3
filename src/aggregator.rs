use serde::Serialize;

use crate::types::ClassifiedSample;

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Ordered, non-empty group of samples submitted together
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Batch {
    samples: Vec<ClassifiedSample>,
}

impl Batch {
    /// Returns `None` for an empty sample list
    pub fn new(samples: Vec<ClassifiedSample>) -> Option<Self> {
        if samples.is_empty() {
            None
        } else {
            Some(Batch { samples })
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn samples(&self) -> &[ClassifiedSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<ClassifiedSample> {
        self.samples
    }
}

/// Buffers classified samples into batches of a fixed size
pub struct SampleAggregator {
    buffer: Vec<ClassifiedSample>,
    batch_size: usize,
}

impl SampleAggregator {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        SampleAggregator {
            buffer: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    /// Buffer a sample; returns the full batch once `batch_size` is reached
    pub fn push(&mut self, sample: ClassifiedSample) -> Option<Batch> {
        self.buffer.push(sample);
        if self.buffer.len() >= self.batch_size {
            self.flush()
        } else {
            None
        }
    }

    /// Hand off whatever is buffered and start a new empty batch
    pub fn flush(&mut self) -> Option<Batch> {
        let samples = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        Batch::new(samples)
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Default for SampleAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawAccelSample, RawGpsFix, UnifiedSample};
    use chrono::Utc;

    fn sample(x: i32) -> ClassifiedSample {
        ClassifiedSample {
            road_state: "Smooth".to_string(),
            agent_data: UnifiedSample {
                user_id: 1,
                accelerometer: RawAccelSample::new(x, 0, 1),
                gps: RawGpsFix::new(0.0, 0.0),
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(Batch::new(Vec::new()).is_none());
    }

    #[test]
    fn test_batch_emitted_at_size() {
        let mut agg = SampleAggregator::new(3);
        assert!(agg.push(sample(0)).is_none());
        assert!(agg.push(sample(1)).is_none());

        let batch = agg.push(sample(2)).expect("batch should be full");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.samples()[2].agent_data.accelerometer.x, 2);
        assert_eq!(agg.pending(), 0);
    }

    #[test]
    fn test_flush_partial_and_empty() {
        let mut agg = SampleAggregator::new(10);
        assert!(agg.flush().is_none());

        agg.push(sample(0));
        agg.push(sample(1));
        let batch = agg.flush().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(agg.flush().is_none());
    }

    #[test]
    fn test_batch_serializes_as_array() {
        let batch = Batch::new(vec![sample(0), sample(1)]).unwrap();
        let json: serde_json::Value = serde_json::to_value(&batch).unwrap();
        assert_eq!(json.as_array().map(|a| a.len()), Some(2));
    }
}

use crate::types::{ClassifiedSample, UnifiedSample};

pub const SMOOTH: &str = "Smooth";
pub const ROUGH: &str = "Rough";

/// Scores a unified sample into a road-state label.
///
/// Implementations must be pure and total.
pub trait Classifier: Send + Sync {
    fn classify(&self, sample: &UnifiedSample) -> String;

    fn label(&self, sample: UnifiedSample) -> ClassifiedSample {
        ClassifiedSample {
            road_state: self.classify(&sample),
            agent_data: sample,
        }
    }
}

/// Placeholder heuristic: positive vertical axis reads as smooth road
#[derive(Debug, Default, Clone, Copy)]
pub struct VerticalAxisClassifier;

impl Classifier for VerticalAxisClassifier {
    fn classify(&self, sample: &UnifiedSample) -> String {
        if sample.accelerometer.z > 0 {
            SMOOTH.to_string()
        } else {
            ROUGH.to_string()
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Snapshot of the agent pipeline, written to disk after each publish attempt
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AgentStatus {
    pub timestamp: f64,
    pub user_id: u32,
    pub samples_aligned: u64,
    pub rows_skipped: u64,
    pub samples_sent: u64,
    pub batches_published: u64,
    pub publish_failures: u64,
    pub batches_dropped: u64,
    pub smooth_samples: u64,
    pub rough_samples: u64,
    pub uptime_seconds: u64,
    // Retry tracking
    pub retry_status: String,
}

impl AgentStatus {
    pub fn new(user_id: u32) -> Self {
        Self {
            timestamp: current_timestamp(),
            user_id,
            samples_aligned: 0,
            rows_skipped: 0,
            samples_sent: 0,
            batches_published: 0,
            publish_failures: 0,
            batches_dropped: 0,
            smooth_samples: 0,
            rough_samples: 0,
            uptime_seconds: 0,
            retry_status: String::new(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

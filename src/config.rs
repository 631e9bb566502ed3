use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::aggregator::DEFAULT_BATCH_SIZE;
use crate::ingest::FanoutPolicy;
use crate::publisher::DEFAULT_TOPIC;
use crate::registry::DEFAULT_QUEUE_CAPACITY;
use crate::smoothing::DEFAULT_SMOOTH_STEP;
use crate::types::UserId;

/// Agent pipeline settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub user_id: UserId,
    pub accelerometer_file: PathBuf,
    pub gps_file: PathBuf,
    pub batch_size: usize,
    pub smooth_step: usize,
    pub store_url: String,
    pub topic: String,
    /// Pause between samples, emulating the sensor rate
    pub delay: Duration,
    pub max_publish_attempts: u32,
    pub retry_cooldown: Duration,
    /// Passes over the recorded data (0 = run until interrupted)
    pub cycles: u32,
    pub output_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            user_id: 1,
            accelerometer_file: PathBuf::from("data/accelerometer.csv"),
            gps_file: PathBuf::from("data/gps.csv"),
            batch_size: DEFAULT_BATCH_SIZE,
            smooth_step: DEFAULT_SMOOTH_STEP,
            store_url: "http://127.0.0.1:8000".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            delay: Duration::from_millis(100),
            max_publish_attempts: 5,
            retry_cooldown: Duration::from_secs(1),
            cycles: 1,
            output_dir: PathBuf::from("road_tracker_sessions"),
        }
    }
}

/// Store service settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bind: SocketAddr,
    pub database: PathBuf,
    pub subscriber_queue: usize,
    /// Per-message WebSocket send timeout
    pub send_timeout: Duration,
    pub fanout_policy: FanoutPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            database: PathBuf::from("road_tracker.db"),
            subscriber_queue: DEFAULT_QUEUE_CAPACITY,
            send_timeout: Duration::from_secs(2),
            fanout_policy: FanoutPolicy::default(),
        }
    }
}

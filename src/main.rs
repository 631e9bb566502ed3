use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tokio::time::Duration;

use road_tracker_rs::classifier::VerticalAxisClassifier;
use road_tracker_rs::config::AgentConfig;
use road_tracker_rs::sensors::FileDatasource;
use road_tracker_rs::transport::HttpTransport;
use road_tracker_rs::Agent;

#[derive(Parser, Debug)]
#[command(name = "road_tracker")]
#[command(about = "Road condition agent - replays sensor recordings and publishes classified batches", long_about = None)]
struct Args {
    /// Accelerometer recording (CSV with x,y,z header)
    #[arg(long, default_value = "data/accelerometer.csv")]
    accelerometer_file: PathBuf,

    /// GPS recording (CSV with longitude,latitude header)
    #[arg(long, default_value = "data/gps.csv")]
    gps_file: PathBuf,

    #[arg(long, env = "USER_ID", default_value = "1")]
    user_id: u32,

    /// Samples per published batch
    #[arg(long, default_value = "10")]
    batch_size: usize,

    /// Interpolated GPS points per pair of fixes
    #[arg(long, default_value = "5")]
    smooth_step: usize,

    #[arg(long, env = "STORE_URL", default_value = "http://127.0.0.1:8000")]
    store_url: String,

    #[arg(long, default_value = "processed_agent_data")]
    topic: String,

    /// Pause between samples in milliseconds
    #[arg(long, default_value = "100")]
    delay_ms: u64,

    #[arg(long, default_value = "5")]
    max_publish_attempts: u32,

    /// Passes over the recording (0 = continuous)
    #[arg(long, default_value = "1")]
    cycles: u32,

    /// Output directory for status snapshots
    #[arg(long, default_value = "road_tracker_sessions")]
    output_dir: PathBuf,
}

impl Args {
    fn into_config(self) -> AgentConfig {
        AgentConfig {
            user_id: self.user_id,
            accelerometer_file: self.accelerometer_file,
            gps_file: self.gps_file,
            batch_size: self.batch_size,
            smooth_step: self.smooth_step,
            store_url: self.store_url,
            topic: self.topic,
            delay: Duration::from_millis(self.delay_ms),
            max_publish_attempts: self.max_publish_attempts,
            cycles: self.cycles,
            output_dir: self.output_dir,
            ..AgentConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();

    println!("[{}] Road Tracker agent starting", ts_now());
    println!("  User: {}", config.user_id);
    println!("  Store: {}", config.store_url);
    println!("  Batch size: {}", config.batch_size);
    println!("  Cycles: {} (0=continuous)", config.cycles);
    println!("  Output Dir: {}", config.output_dir.display());

    let mut source = FileDatasource::new(
        &config.accelerometer_file,
        &config.gps_file,
        config.user_id,
        config.smooth_step,
    );
    let transport = HttpTransport::new(&config.store_url);
    let mut agent = Agent::new(config, VerticalAxisClassifier, transport);

    let status = agent
        .run(&mut source)
        .await
        .context("agent pipeline failed")?;

    println!("\n=== Final Stats ===");
    println!("Aligned samples: {}", status.samples_aligned);
    println!("Skipped rows: {}", status.rows_skipped);
    println!("Samples sent: {}", status.samples_sent);
    println!("Batches published: {}", status.batches_published);
    println!("Batches dropped: {}", status.batches_dropped);
    println!("Smooth / Rough: {} / {}", status.smooth_samples, status.rough_samples);

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

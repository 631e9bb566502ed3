use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use road_tracker_rs::broadcaster::Broadcaster;
use road_tracker_rs::config::StoreConfig;
use road_tracker_rs::ingest::{FanoutPolicy, IngestService};
use road_tracker_rs::registry::SubscriptionRegistry;
use road_tracker_rs::server::{self, AppState};
use road_tracker_rs::storage::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "road_store")]
#[command(about = "Road condition store - persists batches and streams them to live subscribers", long_about = None)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    #[arg(long, env = "STORE_DATABASE", default_value = "road_tracker.db")]
    database: PathBuf,

    /// Queued notifications per live connection before drops
    #[arg(long, default_value = "64")]
    subscriber_queue: usize,

    #[arg(long, default_value = "2000")]
    send_timeout_ms: u64,

    /// per-user | first-sample
    #[arg(long, default_value = "per-user")]
    fanout_policy: FanoutPolicy,
}

impl Args {
    fn into_config(self) -> StoreConfig {
        StoreConfig {
            bind: self.bind,
            database: self.database,
            subscriber_queue: self.subscriber_queue,
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            fanout_policy: self.fanout_policy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();

    let store = SqliteStore::open(&config.database)
        .with_context(|| format!("failed to open database {}", config.database.display()))?;
    let registry = Arc::new(SubscriptionRegistry::with_queue_capacity(config.subscriber_queue));
    let service = IngestService::with_policy(
        Arc::new(store),
        Broadcaster::new(registry),
        config.fanout_policy,
    );

    log::info!(
        "Store using {} (fan-out {:?}, queue {})",
        config.database.display(),
        config.fanout_policy,
        config.subscriber_queue
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    server::serve(listener, AppState::new(service, config.send_timeout)).await?;

    Ok(())
}

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use tokio::time::sleep;

use crate::aggregator::{Batch, SampleAggregator};
use crate::classifier::{Classifier, SMOOTH};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::live_status::{current_timestamp, AgentStatus};
use crate::publisher::BatchPublisher;
use crate::retry::RetryState;
use crate::sensors::FileDatasource;
use crate::transport::Transport;
use crate::types::UnifiedSample;

/// Edge agent loop: classify each aligned sample, batch it and publish.
///
/// A batch whose publish keeps failing is retried with backoff until
/// `max_publish_attempts` is reached, then dropped.
pub struct Agent<T, C> {
    config: AgentConfig,
    classifier: C,
    publisher: BatchPublisher<T>,
    aggregator: SampleAggregator,
    retry: RetryState,
    status: AgentStatus,
    started: Instant,
}

impl<T: Transport, C: Classifier> Agent<T, C> {
    pub fn new(config: AgentConfig, classifier: C, transport: T) -> Self {
        let publisher = BatchPublisher::new(transport, &config.topic);
        let aggregator = SampleAggregator::new(config.batch_size);
        let retry = RetryState::new("publish", config.max_publish_attempts, config.retry_cooldown);
        let status = AgentStatus::new(config.user_id);

        Agent {
            config,
            classifier,
            publisher,
            aggregator,
            retry,
            status,
            started: Instant::now(),
        }
    }

    pub fn status(&self) -> &AgentStatus {
        &self.status
    }

    pub fn publisher(&self) -> &BatchPublisher<T> {
        &self.publisher
    }

    /// Replay the data source for the configured number of cycles and flush
    /// the trailing partial batch.
    pub async fn run(&mut self, source: &mut FileDatasource) -> Result<AgentStatus> {
        fs::create_dir_all(&self.config.output_dir)?;

        let per_cycle = source.start_reading()?;
        self.status.samples_aligned = per_cycle as u64;
        self.status.rows_skipped = source.skipped_rows();

        if per_cycle == 0 {
            log::warn!("No aligned samples in recording, nothing to publish");
            self.save_status();
            return Ok(self.status.clone());
        }

        let total = match self.config.cycles {
            0 => None,
            n => Some(per_cycle * n as usize),
        };
        log::info!(
            "Agent for user {} replaying {} sample(s) per cycle, batch size {}",
            self.config.user_id,
            per_cycle,
            self.aggregator.batch_size()
        );

        let mut processed = 0usize;
        while total.map_or(true, |t| processed < t) {
            let Some(sample) = source.read() else {
                break;
            };
            self.process(sample).await;
            processed += 1;

            if !self.config.delay.is_zero() {
                sleep(self.config.delay).await;
            }
        }

        self.finish().await;
        source.stop_reading();
        Ok(self.status.clone())
    }

    /// Classify and buffer one sample, publishing when a batch fills up
    pub async fn process(&mut self, sample: UnifiedSample) {
        let classified = self.classifier.label(sample);
        if classified.road_state == SMOOTH {
            self.status.smooth_samples += 1;
        } else {
            self.status.rough_samples += 1;
        }

        if let Some(batch) = self.aggregator.push(classified) {
            self.send(batch).await;
        }
    }

    /// Publish whatever is still buffered
    pub async fn finish(&mut self) {
        if let Some(batch) = self.aggregator.flush() {
            log::info!("Flushing partial batch of {} sample(s)", batch.len());
            self.send(batch).await;
        }
    }

    async fn send(&mut self, batch: Batch) {
        loop {
            match self.publisher.publish(&batch).await {
                Ok(()) => {
                    self.retry.record_success();
                    self.status.retry_status = self.retry.status();
                    self.status.batches_published += 1;
                    self.status.samples_sent += batch.len() as u64;
                    break;
                }
                Err(_) => {
                    self.status.publish_failures += 1;
                    let wait = self.retry.record_failed_attempt();
                    if !self.retry.can_retry() {
                        log::error!(
                            "Dropping batch of {} sample(s) after {} attempt(s)",
                            batch.len(),
                            self.retry.attempts
                        );
                        self.status.batches_dropped += 1;
                        self.status.retry_status = self.retry.status();
                        self.retry.reset();
                        break;
                    }
                    self.status.retry_status = self.retry.status();
                    self.save_status();
                    sleep(wait).await;
                }
            }
        }
        self.save_status();
    }

    fn status_path(&self) -> PathBuf {
        self.config.output_dir.join("agent_status.json")
    }

    fn save_status(&mut self) {
        self.status.timestamp = current_timestamp();
        self.status.uptime_seconds = self.started.elapsed().as_secs();
        if let Err(e) = self.status.save(self.status_path()) {
            log::warn!("Failed to write agent status: {}", e);
        }
    }
}

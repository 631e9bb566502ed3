use crate::aggregator::Batch;
use crate::error::Result;
use crate::transport::Transport;

pub const DEFAULT_TOPIC: &str = "processed_agent_data";

/// Serializes batches and hands them to a transport.
///
/// There is no retry loop here: a failed publish is returned to the caller,
/// which decides whether to resend or drop the batch.
pub struct BatchPublisher<T> {
    transport: T,
    topic: String,
}

impl<T: Transport> BatchPublisher<T> {
    pub fn new(transport: T, topic: &str) -> Self {
        BatchPublisher {
            transport,
            topic: topic.to_string(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn publish(&self, batch: &Batch) -> Result<()> {
        let payload = serde_json::to_vec(batch)?;
        match self.transport.publish(&self.topic, payload).await {
            Ok(()) => {
                log::debug!("Published batch of {} sample(s) to {}", batch.len(), self.topic);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to publish batch to topic {}: {}", self.topic, e);
                Err(e)
            }
        }
    }
}

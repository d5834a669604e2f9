use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaError;
use rdkafka::producer::FutureProducer;
use rdkafka::producer::FutureRecord;
use rdkafka::util::Timeout;

use super::ReportSink;
use super::SinkError;
use super::Snapshot;

/// Default topic the per-window counts are published to.
pub const DEFAULT_TOPIC: &str = "unique-requests-count";

/// Key attached to every published count.
pub const MESSAGE_KEY: &str = "unique-request-count";

const MESSAGE_TIMEOUT_MS: &str = "5000";

/// Publishes each window's count to a Kafka topic.
///
/// The payload is the count in decimal, as UTF-8 text.
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
    queue_timeout: Duration,
}

impl std::fmt::Debug for KafkaSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSink")
            .field("topic", &self.topic)
            .field("queue_timeout", &self.queue_timeout)
            .finish_non_exhaustive()
    }
}

impl KafkaSink {
    /// Creates a producer for `brokers` that publishes to `topic`.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Comma-separated list of broker addresses (e.g. "localhost:9092").
    /// * `topic` - Destination topic.
    pub fn new(brokers: &str, topic: &str) -> Result<Self, SinkError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", MESSAGE_TIMEOUT_MS)
            .create()?;

        tracing::info!(brokers, topic, "created kafka producer");

        Ok(Self {
            producer,
            topic: topic.to_string(),
            queue_timeout: Duration::from_secs(1),
        })
    }

    /// Set how long a send may wait for room in the producer queue.
    pub fn with_queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }
}

pub(crate) fn payload(snapshot: Snapshot) -> String {
    snapshot.count.to_string()
}

#[async_trait]
impl ReportSink for KafkaSink {
    async fn report(&self, snapshot: Snapshot) -> Result<(), SinkError> {
        let payload = payload(snapshot);
        let record = FutureRecord::to(&self.topic)
            .key(MESSAGE_KEY)
            .payload(&payload);

        self.producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
            .map_err(|(err, _message): (KafkaError, _)| err)?;

        tracing::info!(
            topic = %self.topic,
            count = snapshot.count,
            "published unique request count"
        );
        Ok(())
    }
}

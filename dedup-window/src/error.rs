/// Errors produced by a [`MembershipStore`](crate::MembershipStore).
///
/// A store error means uniqueness could not be confirmed. It is not the same as
/// "already seen" and callers should not treat it as such.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("membership store unavailable: {0}")]
    Unavailable(String),

    /// A Redis command failed.
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Errors produced by a [`ReportSink`](crate::ReportSink).
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The destination could not be reached.
    #[error("report sink unavailable: {0}")]
    Unavailable(String),

    /// Delivery did not complete within the allowed time.
    #[error("report delivery timed out")]
    Timeout,

    /// The Kafka producer rejected or failed to deliver the message.
    #[cfg(feature = "kafka")]
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

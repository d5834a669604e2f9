use async_trait::async_trait;

use super::ReportSink;
use super::SinkError;
use super::Snapshot;

/// Reports each window as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn report(&self, snapshot: Snapshot) -> Result<(), SinkError> {
        tracing::info!(
            window = snapshot.window,
            count = snapshot.count,
            "unique request count for window"
        );
        Ok(())
    }
}

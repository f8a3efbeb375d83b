use crate::{Lifecycle, OutputModule};
use async_trait::async_trait;
use models::MetricFrame;

/// LogOutput renders frames to the structured log: one line per frame, and
/// one debug line per metric.
pub struct LogOutput;

impl Lifecycle for LogOutput {}

#[async_trait]
impl OutputModule for LogOutput {
    async fn emit(&self, frame: &MetricFrame) -> anyhow::Result<()> {
        tracing::info!(
            frame = frame.name(),
            timestamp = %frame.timestamp(),
            metrics = frame.len(),
            "emitting frame"
        );
        for metric in frame.metrics() {
            tracing::debug!(
                name = %metric.name,
                value = ?metric.value,
                attributes = ?metric.attributes,
                "metric"
            );
        }
        Ok(())
    }
}

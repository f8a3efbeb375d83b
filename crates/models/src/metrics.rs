use super::Scalar;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute carrying the flattened record path a metric value was read from.
pub const ATTR_METRIC_FIELD_NAME: &str = "metric_field_name";

/// Metric is a single named value with attributes. The value is absent only
/// for tasks which explicitly select no metric fields.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: Option<Scalar>,
    pub attributes: BTreeMap<String, Scalar>,
}

/// MetricFrame is an ordered sequence of metrics sharing a task-derived name
/// and a single timestamp. Frames are assembled once by the frame builder:
/// transforms may update metrics in place but cannot add or remove them, and
/// outputs only read.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricFrame {
    name: String,
    timestamp: DateTime<Utc>,
    metrics: Vec<Metric>,
}

impl MetricFrame {
    pub fn new(name: impl Into<String>, timestamp: DateTime<Utc>, metrics: Vec<Metric>) -> Self {
        Self {
            name: name.into(),
            timestamp,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Mutable access for transforms. The slice keeps the frame's length
    /// fixed: metrics may change, the sequence may not grow or shrink.
    pub fn metrics_mut(&mut self) -> &mut [Metric] {
        &mut self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

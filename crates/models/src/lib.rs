mod crontab;
mod durations;
mod metrics;
mod names;
mod records;
mod scalars;
mod specs;

pub use crontab::CronExpr;
pub use durations::{DurationError, TimePeriod, TimeShift};
pub use metrics::{Metric, MetricFrame, ATTR_METRIC_FIELD_NAME};
pub use names::{InvalidName, ModuleName, ModuleType, TaskName};
pub use records::{Record, RecordValue, Records};
pub use scalars::Scalar;
pub use specs::{
    AttrSelector, FlowSection, FlowSpec, InputDef, MetricSelector, Modifiers, ModuleVariant,
    OutputDef, ResultSelector, RouteFilters, TaskDef, TransformDef, PRIORITY_MAX, PRIORITY_MIN,
};

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

fn is_null(v: &serde_json::Value) -> bool {
    v.is_null()
}

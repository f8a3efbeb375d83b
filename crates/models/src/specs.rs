use super::{
    default_true, is_null, is_true, CronExpr, ModuleName, ModuleType, Scalar, TaskName, TimePeriod,
    TimeShift,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transform priorities are bounded to a signed byte-ish range; ties are
/// broken by declaration order.
pub const PRIORITY_MIN: i64 = -256;
pub const PRIORITY_MAX: i64 = 256;

/// ModuleVariant is the capability class of a module type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleVariant {
    Input,
    Transform,
    Output,
}

impl ModuleVariant {
    pub fn as_str(&self) -> &'static str {
        match *self {
            ModuleVariant::Input => "input",
            ModuleVariant::Transform => "transform",
            ModuleVariant::Output => "output",
        }
    }
}

impl std::fmt::Display for ModuleVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ModuleVariant {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// FlowSpec is the composed, validated configuration document:
/// the flow header plus every declared module.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FlowSpec {
    #[serde(default)]
    pub flow: FlowSection,
    /// Environment variables exported into the process before modules run.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<TransformDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputDef>,
}

impl FlowSpec {
    /// All tasks of all inputs, with the owning input's display name.
    pub fn tasks(&self) -> impl Iterator<Item = (&InputDef, &TaskDef)> {
        self.inputs
            .iter()
            .flat_map(|input| input.tasks.iter().map(move |task| (input, task)))
    }
}

/// FlowSection is the `flow:` header of the root document.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FlowSection {
    #[serde(default = "FlowSection::default_version")]
    pub version: i64,
    /// Paths of extension documents merged beneath this one,
    /// relative to the root document's directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    /// Settings applied with the lowest precedence
    /// (command line and environment win).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl FlowSection {
    fn default_version() -> i64 {
        1
    }
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            version: Self::default_version(),
            extends: Vec::new(),
            settings: BTreeMap::new(),
        }
    }
}

/// InputDef declares an input module instance and the tasks it owns.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InputDef {
    #[serde(rename = "type")]
    pub type_: ModuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ModuleName>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    /// Connection settings, shaped by the module's own schema.
    #[serde(default, skip_serializing_if = "is_null")]
    pub connection: serde_json::Value,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
}

impl InputDef {
    /// The name this input is addressed by in filters and logs.
    pub fn display_name(&self) -> &str {
        self.name
            .as_ref()
            .map(|n| n.as_str())
            .unwrap_or(self.type_.as_str())
    }
}

/// TransformDef declares a transform module instance.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransformDef {
    #[serde(rename = "type")]
    pub type_: ModuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ModuleName>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "is_null")]
    pub connection: serde_json::Value,
    #[serde(default, skip_serializing_if = "is_null")]
    pub params: serde_json::Value,
    /// Chain ordering: higher priorities run earlier, negative last.
    #[serde(default)]
    pub priority: i64,
    #[serde(flatten)]
    pub filters: RouteFilters,
}

impl TransformDef {
    pub fn display_name(&self) -> &str {
        self.name
            .as_ref()
            .map(|n| n.as_str())
            .unwrap_or(self.type_.as_str())
    }
}

/// OutputDef declares an output module instance.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OutputDef {
    #[serde(rename = "type")]
    pub type_: ModuleType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ModuleName>,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "is_null")]
    pub connection: serde_json::Value,
    #[serde(default, skip_serializing_if = "is_null")]
    pub params: serde_json::Value,
    #[serde(flatten)]
    pub filters: RouteFilters,
}

impl OutputDef {
    pub fn display_name(&self) -> &str {
        self.name
            .as_ref()
            .map(|n| n.as_str())
            .unwrap_or(self.type_.as_str())
    }
}

/// RouteFilters admit or reject (task, input) pairs for a transform or
/// output. Entries are glob patterns. Include and exclude of the same kind
/// are mutually exclusive; filters of different kinds combine with AND, and
/// a missing filter is permissive.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RouteFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_tasks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_inputs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_tasks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_inputs: Option<Vec<String>>,
}

/// TaskDef is a scheduled unit owned by an input.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskDef {
    pub name: TaskName,
    pub cron: CronExpr,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub enabled: bool,
    #[serde(default)]
    pub result: ResultSelector,
    /// Attributes merged into every produced metric.
    /// They win over record-derived attributes on collision.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub static_attributes: BTreeMap<String, Scalar>,
    #[serde(default = "TaskDef::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "TaskDef::default_retry_delay")]
    pub retry_delay: TimePeriod,
    #[serde(default, skip_serializing_if = "Modifiers::is_empty")]
    pub modifiers: Modifiers,
    /// Parameters handed to the owning input on every fire.
    #[serde(default, skip_serializing_if = "is_null")]
    pub params: serde_json::Value,
}

impl TaskDef {
    pub fn default_max_retries() -> u32 {
        2
    }

    pub fn default_retry_delay() -> TimePeriod {
        TimePeriod::from_secs(10)
    }
}

/// ResultSelector shapes how an input's records project into metrics and
/// attributes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResultSelector {
    #[serde(default)]
    pub metrics: MetricSelector,
    /// When omitted, attributes are the complement of the selected metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttrSelector>,
}

/// MetricSelector resolves the record fields which become metric values.
///
/// An absent `metrics` entry is the literal selector `"metric"`; an explicit
/// null selects no metric fields at all (gated by `allow_none_metric`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MetricSelector {
    None,
    One(String),
    Many(Vec<String>),
}

impl Default for MetricSelector {
    fn default() -> Self {
        MetricSelector::One("metric".to_string())
    }
}

impl MetricSelector {
    pub fn is_none(&self) -> bool {
        matches!(self, MetricSelector::None)
    }

    /// Selector entries in declaration order, or None for the null selector.
    pub fn entries(&self) -> Option<Vec<&str>> {
        match self {
            MetricSelector::None => None,
            MetricSelector::One(key) => Some(vec![key.as_str()]),
            MetricSelector::Many(keys) => Some(keys.iter().map(String::as_str).collect()),
        }
    }
}

/// AttrSelector resolves the record fields carried as attributes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum AttrSelector {
    One(String),
    Many(Vec<String>),
}

impl AttrSelector {
    pub fn entries(&self) -> Vec<&str> {
        match self {
            AttrSelector::One(key) => vec![key.as_str()],
            AttrSelector::Many(keys) => keys.iter().map(String::as_str).collect(),
        }
    }
}

/// Modifiers adjust the frame timestamp: the base instant is floored to
/// `time_modulus` first, then shifted by `time_offset`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Modifiers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_offset: Option<TimeShift>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_modulus: Option<TimePeriod>,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        self.time_offset.is_none() && self.time_modulus.is_none()
    }
}

use super::{InputModule, OutputModule, TransformModule};
use models::{RouteFilters, TaskDef};
use std::sync::Arc;

/// A transform bound into a task's chain, carrying its resolved display
/// name and priority for ordering and logs.
#[derive(Clone)]
pub struct BoundTransform {
    pub name: String,
    pub priority: i64,
    pub module: Arc<dyn TransformModule>,
}

/// An output bound into a task's chain.
#[derive(Clone)]
pub struct BoundOutput {
    pub name: String,
    pub module: Arc<dyn OutputModule>,
}

/// TaskChain is the compiled (input, task, transforms, outputs) tuple.
/// Chains are computed once at startup and never change.
pub struct TaskChain {
    pub input_name: String,
    pub input: Arc<dyn InputModule>,
    pub task: TaskDef,
    /// Admitted transforms, sorted by descending priority; ties keep
    /// declaration order, so negative priorities run last.
    pub transforms: Vec<BoundTransform>,
    /// Admitted outputs in declaration order.
    pub outputs: Vec<BoundOutput>,
}

impl TaskChain {
    /// The stable ordering of a transform chain.
    pub fn sort_transforms(transforms: &mut [BoundTransform]) {
        transforms.sort_by_key(|t| std::cmp::Reverse(t.priority));
    }

    /// Render this chain for `--only-validate` output.
    pub fn render(&self) -> String {
        let transforms = if self.transforms.is_empty() {
            "(none)".to_string()
        } else {
            self.transforms
                .iter()
                .map(|t| {
                    if t.priority != 0 {
                        format!("{} (priority {})", t.name, t.priority)
                    } else {
                        t.name.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let outputs = if self.outputs.is_empty() {
            "(none)".to_string()
        } else {
            self.outputs
                .iter()
                .map(|o| o.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        format!(
            "task {:?} of input {:?} (cron {:?})\n  transforms: {}\n  outputs: {}",
            self.task.name.as_str(),
            self.input_name,
            self.task.cron.as_str(),
            transforms,
            outputs,
        )
    }
}

/// Whether a module's routing filters admit the given (task, input) pair.
///
/// Include lists admit only matches and exclude lists admit only
/// non-matches; the task-keyed and input-keyed filters combine with AND,
/// and missing filters are permissive. Entries are glob patterns.
pub fn admits(filters: &RouteFilters, task: &str, input: &str) -> bool {
    let admit_one = |include: &Option<Vec<String>>,
                     exclude: &Option<Vec<String>>,
                     candidate: &str| {
        if let Some(patterns) = include {
            return matches_any(patterns, candidate);
        }
        if let Some(patterns) = exclude {
            return !matches_any(patterns, candidate);
        }
        true
    };

    admit_one(&filters.include_tasks, &filters.exclude_tasks, task)
        && admit_one(&filters.include_inputs, &filters.exclude_inputs, input)
}

fn matches_any(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|pattern| {
        match glob::Pattern::new(pattern) {
            Ok(pattern) => pattern.matches(candidate),
            // Pattern syntax is validated at load time; an unparseable
            // pattern degrades to literal comparison.
            Err(_) => pattern == candidate,
        }
    })
}

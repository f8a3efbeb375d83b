use super::{expand, load, LoadError};
use models::{FlowSpec, ModuleVariant, TaskName};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use validation::{walk, Error, Errors, Property, Schema, Scope, SUGGEST_DISTANCE};

/// The schemas a registered module type contributes to validation.
pub struct ModuleSchemas<'a> {
    pub variant: ModuleVariant,
    pub connection: &'a Schema,
    /// Task parameters for inputs; module parameters for transforms and
    /// outputs.
    pub params: &'a Schema,
}

/// SchemaSource resolves module `type` strings to their declared schemas.
/// The module registry implements this.
pub trait SchemaSource {
    fn lookup(&self, type_: &str) -> Option<ModuleSchemas<'_>>;
    /// Registered type names of a variant, for typo suggestions.
    fn known_types(&self, variant: ModuleVariant) -> Vec<&str>;
}

/// Settings which shape validation itself. They are resolved from the
/// command line and environment before the configuration is read.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Modules and tasks default to disabled until explicitly enabled.
    pub disable_default: bool,
    /// Do not apply parameter schemas to disabled modules and tasks.
    pub skip_disabled_validation: bool,
    /// Permit tasks whose metric selector is an explicit null.
    pub allow_none_metric: bool,
}

/// Load, compose, expand, and strictly validate a configuration.
///
/// IO and parse failures are fatal and returned as `LoadError`. Validation
/// failures accumulate: the normalized document and every scoped error are
/// returned together, and the typed `FlowSpec` is present only when the
/// document is clean.
pub fn build(
    root: &Path,
    extra: &[PathBuf],
    registry: &dyn SchemaSource,
    options: &BuildOptions,
) -> Result<(Option<FlowSpec>, Value, Errors), LoadError> {
    let mut doc = load::load(root, extra)?;

    let mut errors = Errors::new();
    expand::expand_repeats(&mut doc, &mut errors);
    export_env(&doc);

    let (normalized, more) = validate(&doc, registry, options);
    errors.extend(more);

    let spec = if errors.is_empty() {
        match serde_json::from_value::<FlowSpec>(normalized.clone()) {
            Ok(spec) => Some(spec),
            Err(err) => {
                errors.push(
                    Scope::root(),
                    Error::Decode {
                        detail: err.to_string(),
                    },
                );
                None
            }
        }
    } else {
        None
    };
    Ok((spec, normalized, errors))
}

/// Strictly validate a composed document, returning its normalized form and
/// all accumulated errors.
pub fn validate(
    doc: &Value,
    registry: &dyn SchemaSource,
    options: &BuildOptions,
) -> (Value, Errors) {
    let mut errors = Errors::new();

    let mut normalized = walk(Scope::root(), &flow_schema(options), doc, &mut errors);

    walk_modules(&mut normalized, registry, options, &mut errors);
    walk_names(&normalized, &mut errors);
    walk_transforms(&normalized, &mut errors);
    walk_route_filters(&normalized, &mut errors);
    walk_tasks(&normalized, options, &mut errors);

    (normalized, errors)
}

/// Root `env:` entries are exported into the process environment before
/// strict validation, so that module schemas and connections may read them.
fn export_env(doc: &Value) {
    let Some(env) = doc.get("env").and_then(Value::as_object) else {
        return;
    };
    for (key, value) in env {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        tracing::debug!(key = %key, "exporting environment variable");
        std::env::set_var(key, rendered);
    }
}

/// The structural schema of the composed document. Module-specific
/// `connection` and `params` shapes are refined afterwards, once each
/// entry's `type` is known.
fn flow_schema(options: &BuildOptions) -> Schema {
    let enabled = || {
        Property::with_default("enabled", Schema::Bool, json!(!options.disable_default))
    };
    let filter = |key: &str| Property::optional(key, Schema::list_of(Schema::Str));

    let result = Schema::object(vec![
        Property::with_default(
            "metrics",
            Schema::Union(vec![Schema::Null, Schema::Str, Schema::list_of(Schema::Str)]),
            json!("metric"),
        ),
        Property::optional(
            "attributes",
            Schema::Union(vec![Schema::Str, Schema::list_of(Schema::Str)]),
        ),
    ]);

    let task = Schema::object(vec![
        Property::required("name", Schema::Str),
        Property::required("cron", Schema::Cron),
        enabled(),
        Property::optional("result", result),
        Property::optional("static_attributes", Schema::dict_of(Schema::Scalar)),
        Property::with_default("max_retries", Schema::Int, json!(2)),
        Property::with_default("retry_delay", Schema::Duration, json!(10)),
        Property::optional(
            "modifiers",
            Schema::object(vec![
                Property::optional("time_offset", Schema::SignedDuration),
                Property::optional("time_modulus", Schema::Duration),
            ]),
        ),
        Property::optional("params", Schema::Any),
    ]);

    let input = Schema::object(vec![
        Property::required("type", Schema::Str),
        Property::optional("name", Schema::Str),
        enabled(),
        Property::optional("connection", Schema::Any),
        Property::required("tasks", Schema::list_of(task)),
    ]);

    let transform = Schema::object(vec![
        Property::required("type", Schema::Str),
        Property::optional("name", Schema::Str),
        enabled(),
        Property::optional("connection", Schema::Any),
        Property::optional("params", Schema::Any),
        Property::with_default("priority", Schema::Int, json!(0)),
        filter("include_tasks"),
        filter("include_inputs"),
        filter("exclude_tasks"),
        filter("exclude_inputs"),
    ]);

    let output = Schema::object(vec![
        Property::required("type", Schema::Str),
        Property::optional("name", Schema::Str),
        enabled(),
        Property::optional("connection", Schema::Any),
        Property::optional("params", Schema::Any),
        filter("include_tasks"),
        filter("include_inputs"),
        filter("exclude_tasks"),
        filter("exclude_inputs"),
    ]);

    Schema::object(vec![
        Property::optional(
            "flow",
            Schema::object(vec![
                Property::with_default("version", Schema::Int, json!(1)),
                Property::optional("extends", Schema::list_of(Schema::Str)),
                Property::optional("settings", Schema::dict_of(Schema::Any)),
            ]),
        ),
        Property::optional("env", Schema::dict_of(Schema::Str)),
        Property::with_default("inputs", Schema::list_of(input), json!([])),
        Property::with_default("transforms", Schema::list_of(transform), json!([])),
        Property::with_default("outputs", Schema::list_of(output), json!([])),
    ])
}

const SECTIONS: [(&str, ModuleVariant); 3] = [
    ("inputs", ModuleVariant::Input),
    ("transforms", ModuleVariant::Transform),
    ("outputs", ModuleVariant::Output),
];

/// Resolve each module entry's `type` through the registry and apply its
/// connection and parameter schemas in place.
fn walk_modules(
    doc: &mut Value,
    registry: &dyn SchemaSource,
    options: &BuildOptions,
    errors: &mut Errors,
) {
    for (section, variant) in SECTIONS {
        let root = Scope::root();
        let scope = root.push_prop(section);

        let Some(entries) = doc.get_mut(section).and_then(Value::as_array_mut) else {
            continue;
        };
        for (index, entry) in entries.iter_mut().enumerate() {
            let scope = scope.push_item(index);
            walk_module(scope, entry, variant, registry, options, errors);
        }
    }
}

fn walk_module(
    scope: Scope<'_>,
    entry: &mut Value,
    variant: ModuleVariant,
    registry: &dyn SchemaSource,
    options: &BuildOptions,
    errors: &mut Errors,
) {
    // Structurally malformed entries were already reported.
    let Some(map) = entry.as_object_mut() else {
        return;
    };
    let Some(type_) = map.get("type").and_then(Value::as_str).map(str::to_string) else {
        return;
    };
    let enabled = map.get("enabled").and_then(Value::as_bool).unwrap_or(true);

    let Some(schemas) = registry.lookup(&type_) else {
        let known = registry.known_types(variant);
        let error = match closest(&type_, known.into_iter()) {
            Some(suggest) => Error::NoSuchModuleTypeSuggest {
                type_: type_.clone(),
                variant,
                suggest: suggest.to_string(),
            },
            None => Error::NoSuchModuleType {
                type_: type_.clone(),
                variant,
            },
        };
        errors.push(scope.push_prop("type"), error);
        return;
    };
    if schemas.variant != variant {
        errors.push(
            scope.push_prop("type"),
            Error::WrongVariant {
                type_: type_.clone(),
                expect: variant,
                actual: schemas.variant,
            },
        );
        return;
    }
    if !enabled && options.skip_disabled_validation {
        return;
    }

    let connection = map.get("connection").cloned().unwrap_or_else(|| json!({}));
    {
        let scope = scope.push_prop("connection");
        let walked = walk(scope, schemas.connection, &connection, errors);
        map.insert("connection".to_string(), walked);
    }

    match variant {
        ModuleVariant::Transform | ModuleVariant::Output => {
            let params = map.get("params").cloned().unwrap_or_else(|| json!({}));
            let scope = scope.push_prop("params");
            let walked = walk(scope, schemas.params, &params, errors);
            map.insert("params".to_string(), walked);
        }
        ModuleVariant::Input => {
            let scope = scope.push_prop("tasks");
            let Some(tasks) = map.get_mut("tasks").and_then(Value::as_array_mut) else {
                return;
            };
            for (index, task) in tasks.iter_mut().enumerate() {
                let scope = scope.push_item(index);
                let Some(task) = task.as_object_mut() else {
                    continue;
                };
                let task_enabled = task
                    .get("enabled")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if !task_enabled && options.skip_disabled_validation {
                    continue;
                }

                let params = task.get("params").cloned().unwrap_or_else(|| json!({}));
                let scope = scope.push_prop("params");
                let walked = walk(scope, schemas.params, &params, errors);
                task.insert("params".to_string(), walked);
            }
        }
    }
}

/// Task names are globally unique across all inputs; module names are
/// unique within their variant.
fn walk_names(doc: &Value, errors: &mut Errors) {
    for (section, variant) in SECTIONS {
        let root = Scope::root();
        let scope = root.push_prop(section);

        let mut seen = BTreeSet::new();
        for (index, entry) in array_of(doc, section) {
            let scope = scope.push_item(index);
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };

            if let Err(err) = models::ModuleName::new(name).validate() {
                errors.push(scope.push_prop("name"), err.into());
            }
            if !seen.insert(name.to_string()) {
                errors.push(
                    scope.push_prop("name"),
                    Error::Duplicate {
                        entity: variant.as_str(),
                        name: name.to_string(),
                    },
                );
            }
        }
    }

    let root = Scope::root();
    let scope = root.push_prop("inputs");
    let mut seen = BTreeSet::new();
    for (index, input) in array_of(doc, "inputs") {
        let scope = scope.push_item(index);
        let scope = scope.push_prop("tasks");

        let Some(tasks) = input.get("tasks").and_then(Value::as_array) else {
            continue;
        };
        for (index, task) in tasks.iter().enumerate() {
            let scope = scope.push_item(index);
            let Some(name) = task.get("name").and_then(Value::as_str) else {
                continue;
            };

            if let Err(err) = TaskName::new(name).validate() {
                errors.push(scope.push_prop("name"), err.into());
            }
            if !seen.insert(name.to_string()) {
                errors.push(
                    scope.push_prop("name"),
                    Error::Duplicate {
                        entity: "task",
                        name: name.to_string(),
                    },
                );
            }
        }
    }
}

/// Transform priorities must stay inside the permitted range.
fn walk_transforms(doc: &Value, errors: &mut Errors) {
    let root = Scope::root();
    let scope = root.push_prop("transforms");

    for (index, entry) in array_of(doc, "transforms") {
        let scope = scope.push_item(index);
        let Some(priority) = entry.get("priority").and_then(Value::as_i64) else {
            continue;
        };
        if !(models::PRIORITY_MIN..=models::PRIORITY_MAX).contains(&priority) {
            errors.push(
                scope.push_prop("priority"),
                Error::PriorityRange { value: priority },
            );
        }
    }
}

/// Include and exclude filters of the same kind are mutually exclusive,
/// and every filter entry must be a valid glob pattern.
fn walk_route_filters(doc: &Value, errors: &mut Errors) {
    for section in ["transforms", "outputs"] {
        let root = Scope::root();
        let scope = root.push_prop(section);

        for (index, entry) in array_of(doc, section) {
            let scope = scope.push_item(index);

            for kind in ["tasks", "inputs"] {
                let include = format!("include_{kind}");
                let exclude = format!("exclude_{kind}");
                if entry.get(&include).is_some() && entry.get(&exclude).is_some() {
                    errors.push(scope, Error::FilterConflict { kind });
                }
            }

            for key in [
                "include_tasks",
                "include_inputs",
                "exclude_tasks",
                "exclude_inputs",
            ] {
                let Some(patterns) = entry.get(key).and_then(Value::as_array) else {
                    continue;
                };
                let scope = scope.push_prop(key);
                for (index, pattern) in patterns.iter().enumerate() {
                    let Some(pattern) = pattern.as_str() else {
                        continue;
                    };
                    if let Err(err) = glob::Pattern::new(pattern) {
                        errors.push(
                            scope.push_item(index),
                            Error::InvalidPattern {
                                pattern: pattern.to_string(),
                                detail: err.to_string(),
                            },
                        );
                    }
                }
            }
        }
    }
}

/// Per-task semantic checks: the none-metric gate, literal selector
/// disjointness, selector pattern syntax, and a positive time modulus.
fn walk_tasks(doc: &Value, options: &BuildOptions, errors: &mut Errors) {
    let root = Scope::root();
    let scope = root.push_prop("inputs");

    for (index, input) in array_of(doc, "inputs") {
        let scope = scope.push_item(index);
        let scope = scope.push_prop("tasks");

        let Some(tasks) = input.get("tasks").and_then(Value::as_array) else {
            continue;
        };
        for (index, task) in tasks.iter().enumerate() {
            let scope = scope.push_item(index);
            walk_task(scope, task, options, errors);
        }
    }
}

fn walk_task(scope: Scope<'_>, task: &Value, options: &BuildOptions, errors: &mut Errors) {
    let name = task.get("name").and_then(Value::as_str).unwrap_or_default();

    let metrics = task.pointer("/result/metrics");
    let attributes = task.pointer("/result/attributes");

    if matches!(metrics, Some(Value::Null)) && !options.allow_none_metric {
        let scope = scope.push_prop("result");
        errors.push(
            scope.push_prop("metrics"),
            Error::NoneMetricNotAllowed {
                task: name.to_string(),
            },
        );
    }

    // Selector entries must be valid glob patterns, and literal metric and
    // attribute selectors may not overlap.
    let metric_keys = selector_entries(metrics);
    let attribute_keys = selector_entries(attributes);

    for (field, keys) in [("metrics", &metric_keys), ("attributes", &attribute_keys)] {
        let scope = scope.push_prop("result");
        let scope = scope.push_prop(field);
        for key in keys {
            if let Err(err) = glob::Pattern::new(key) {
                errors.push(
                    scope,
                    Error::InvalidPattern {
                        pattern: key.to_string(),
                        detail: err.to_string(),
                    },
                );
            }
        }
    }

    let literal = |keys: &[String]| -> BTreeSet<String> {
        keys.iter()
            .filter(|k| !is_pattern(k))
            .cloned()
            .collect()
    };
    let overlap: Vec<String> = literal(&metric_keys)
        .intersection(&literal(&attribute_keys))
        .cloned()
        .collect();
    for key in overlap {
        let scope = scope.push_prop("result");
        errors.push(
            scope,
            Error::SelectorOverlap {
                task: name.to_string(),
                key,
            },
        );
    }

    if let Some(modulus) = task.pointer("/modifiers/time_modulus") {
        let zero = match modulus {
            Value::Number(n) => n.as_u64() == Some(0),
            Value::String(s) => s
                .parse::<models::TimePeriod>()
                .map(|p| p.as_secs() == 0)
                .unwrap_or(false),
            _ => false,
        };
        if zero {
            let scope = scope.push_prop("modifiers");
            errors.push(scope.push_prop("time_modulus"), Error::ZeroModulus);
        }
    }
}

fn selector_entries(selector: Option<&Value>) -> Vec<String> {
    match selector {
        Some(Value::String(key)) => vec![key.clone()],
        Some(Value::Array(keys)) => keys
            .iter()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn is_pattern(key: &str) -> bool {
    key.contains(['*', '?', '['])
}

fn array_of<'d>(doc: &'d Value, section: &str) -> impl Iterator<Item = (usize, &'d Value)> {
    doc.get(section)
        .and_then(Value::as_array)
        .map(|entries| entries.iter().enumerate())
        .into_iter()
        .flatten()
}

fn closest<'a>(needle: &str, haystack: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    haystack
        .filter_map(|candidate| {
            let dist = strsim::osa_distance(needle, candidate);
            (dist <= SUGGEST_DISTANCE).then_some((dist, candidate))
        })
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, candidate)| candidate)
}

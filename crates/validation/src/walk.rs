use super::{Error, Errors, Schema, Scope, SUGGEST_DISTANCE};
use models::{CronExpr, TimePeriod, TimeShift};
use serde_json::Value;

/// Walk a configuration value against its schema, accumulating scoped
/// errors and returning the normalized document: optional properties are
/// filled from schema defaults, and omitted all-optional maps are
/// synthesized. Walking an already-normalized document is a no-op.
pub fn walk(scope: Scope<'_>, schema: &Schema, value: &Value, errors: &mut Errors) -> Value {
    match schema {
        Schema::Any => value.clone(),

        Schema::Null => expect(scope, schema, value, errors, |v| v.is_null()),
        Schema::Str => expect(scope, schema, value, errors, |v| v.is_string()),
        Schema::Bool => expect(scope, schema, value, errors, |v| v.is_boolean()),
        Schema::Int => expect(scope, schema, value, errors, |v| {
            v.as_i64().is_some() || v.as_u64().is_some()
        }),
        Schema::Float => expect(scope, schema, value, errors, |v| v.is_number()),
        Schema::Scalar => expect(scope, schema, value, errors, |v| {
            !v.is_array() && !v.is_object()
        }),

        Schema::Duration => walk_duration(scope, value, errors),
        Schema::SignedDuration => walk_signed_duration(scope, value, errors),
        Schema::Cron => walk_cron(scope, value, errors),

        Schema::List(item) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, v) in items.iter().enumerate() {
                    let scope = scope.push_item(index);
                    out.push(walk(scope, item, v, errors));
                }
                Value::Array(out)
            }
            _ => mismatch(scope, schema, value, errors),
        },

        Schema::Dict(entry) => match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, v) in map {
                    let scope = scope.push_prop(key);
                    out.insert(key.clone(), walk(scope, entry, v, errors));
                }
                Value::Object(out)
            }
            _ => mismatch(scope, schema, value, errors),
        },

        Schema::Object(props) => match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::new();

                for prop in props {
                    match map.get(&prop.key) {
                        Some(v) => {
                            let scope = scope.push_prop(&prop.key);
                            out.insert(prop.key.clone(), walk(scope, &prop.schema, v, errors));
                        }
                        None if prop.required => errors.push(
                            scope,
                            Error::MissingProperty {
                                key: prop.key.clone(),
                            },
                        ),
                        None => {
                            if let Some(default) = &prop.default {
                                out.insert(prop.key.clone(), default.clone());
                            } else if let Some(synthesized) = prop.schema.synthesized() {
                                out.insert(prop.key.clone(), synthesized);
                            }
                        }
                    }
                }

                for key in map.keys() {
                    if !props.iter().any(|p| p.key == *key) {
                        errors.push(scope, unknown_property(key, props));
                    }
                }
                Value::Object(out)
            }
            _ => mismatch(scope, schema, value, errors),
        },

        Schema::Union(branches) => walk_union(scope, branches, value, errors),
    }
}

/// The unknown-property error, proposing the closest expected key when one
/// is within edit distance, together with an example valid value.
fn unknown_property(key: &str, props: &[super::Property]) -> Error {
    let closest = props
        .iter()
        .filter_map(|p| {
            let dist = strsim::osa_distance(key, &p.key);
            (dist <= SUGGEST_DISTANCE).then_some((dist, p))
        })
        .min_by_key(|(dist, _)| *dist);

    match closest {
        Some((_, prop)) => Error::UnknownPropertySuggest {
            key: key.to_string(),
            suggest: prop.key.clone(),
            example: prop.example().to_string(),
        },
        None => Error::UnknownProperty {
            key: key.to_string(),
        },
    }
}

fn walk_union(
    scope: Scope<'_>,
    branches: &[Schema],
    value: &Value,
    errors: &mut Errors,
) -> Value {
    // Evaluate every branch into a scratch space, scoring each by how many
    // required keys it matched. A clean branch with the highest score wins;
    // failing that, the highest-scoring branch's own errors are adopted.
    let mut outcomes = Vec::with_capacity(branches.len());
    for branch in branches {
        let mut scratch = Errors::new();
        let normalized = walk(scope, branch, value, &mut scratch);
        outcomes.push((branch.match_score(value), normalized, scratch));
    }

    let clean = outcomes
        .iter()
        .enumerate()
        .filter(|(_, outcome)| outcome.2.is_empty())
        .max_by_key(|(index, outcome)| (outcome.0, std::cmp::Reverse(*index)))
        .map(|(index, _)| index);
    if let Some(index) = clean {
        return outcomes.swap_remove(index).1;
    }

    let best = outcomes
        .iter()
        .enumerate()
        .max_by_key(|(index, outcome)| (outcome.0, std::cmp::Reverse(*index)))
        .map(|(index, _)| index);
    match best {
        Some(index) if outcomes[index].0 > 0 => {
            let (_, normalized, scratch) = outcomes.swap_remove(index);
            errors.extend(scratch);
            normalized
        }
        _ => {
            let firsts = branches
                .iter()
                .zip(&outcomes)
                .map(|(branch, (_, _, scratch))| match scratch.first() {
                    Some(scoped) => format!("{} ({})", branch.kind_name(), scoped.error),
                    None => branch.kind_name().to_string(),
                })
                .collect();
            errors.push(scope, Error::UnionMismatch { branches: firsts });
            value.clone()
        }
    }
}

fn walk_duration(scope: Scope<'_>, value: &Value, errors: &mut Errors) -> Value {
    let ok = match value {
        Value::Number(n) => n.as_u64().is_some(),
        Value::String(s) => s.parse::<TimePeriod>().is_ok(),
        _ => false,
    };
    if !ok {
        errors.push(
            scope,
            Error::InvalidDuration {
                value: render(value),
            },
        );
    }
    value.clone()
}

fn walk_signed_duration(scope: Scope<'_>, value: &Value, errors: &mut Errors) -> Value {
    let ok = match value {
        Value::Number(n) => n.as_i64().is_some(),
        Value::String(s) => s.parse::<TimeShift>().is_ok(),
        _ => false,
    };
    if !ok {
        errors.push(
            scope,
            Error::InvalidShift {
                value: render(value),
            },
        );
    }
    value.clone()
}

fn walk_cron(scope: Scope<'_>, value: &Value, errors: &mut Errors) -> Value {
    match value {
        Value::String(s) => {
            if let Err(err) = CronExpr::new(s.as_str()).schedule() {
                errors.push(
                    scope,
                    Error::InvalidCron {
                        value: s.clone(),
                        detail: err.to_string(),
                    },
                );
            }
        }
        _ => errors.push(
            scope,
            Error::TypeMismatch {
                expected: Schema::Cron.kind_name(),
                actual: actual_kind(value),
            },
        ),
    }
    value.clone()
}

fn expect(
    scope: Scope<'_>,
    schema: &Schema,
    value: &Value,
    errors: &mut Errors,
    pred: impl Fn(&Value) -> bool,
) -> Value {
    if !pred(value) {
        return mismatch(scope, schema, value, errors);
    }
    value.clone()
}

fn mismatch(scope: Scope<'_>, schema: &Schema, value: &Value, errors: &mut Errors) -> Value {
    errors.push(
        scope,
        Error::TypeMismatch {
            expected: schema.kind_name(),
            actual: actual_kind(value),
        },
    );
    value.clone()
}

fn actual_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::super::Property;
    use super::*;
    use serde_json::json;

    fn task_schema() -> Schema {
        Schema::object(vec![
            Property::required("name", Schema::Str),
            Property::required("cron", Schema::Cron),
            Property::with_default("max_retries", Schema::Int, json!(2)),
            Property::with_default("retry_delay", Schema::Duration, json!(10)),
            Property::optional(
                "modifiers",
                Schema::object(vec![
                    Property::optional("time_offset", Schema::SignedDuration),
                    Property::optional("time_modulus", Schema::Duration),
                ]),
            ),
            Property::optional(
                "result",
                Schema::object(vec![
                    Property::with_default(
                        "metrics",
                        Schema::Union(vec![
                            Schema::Null,
                            Schema::Str,
                            Schema::list_of(Schema::Str),
                        ]),
                        json!("metric"),
                    ),
                    Property::optional(
                        "attributes",
                        Schema::Union(vec![Schema::Str, Schema::list_of(Schema::Str)]),
                    ),
                ]),
            ),
        ])
    }

    fn run(schema: &Schema, doc: Value) -> (Value, Errors) {
        let mut errors = Errors::new();
        let out = walk(Scope::root(), schema, &doc, &mut errors);
        (out, errors)
    }

    #[test]
    fn test_missing_required() {
        let (_, errors) = run(&task_schema(), json!({"name": "t1"}));
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.first().unwrap().error,
            Error::MissingProperty {
                key: "cron".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_property_with_suggestion() {
        let (_, errors) = run(
            &task_schema(),
            json!({"name": "t1", "cronn": "0 0 * * *", "cron": "0 0 * * *"}),
        );
        assert_eq!(
            errors.first().unwrap().error,
            Error::UnknownPropertySuggest {
                key: "cronn".to_string(),
                suggest: "cron".to_string(),
                example: "\"0 0 * * *\"".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_property_without_suggestion() {
        let (_, errors) = run(
            &task_schema(),
            json!({"name": "t1", "cron": "0 0 * * *", "bogus_key": 3}),
        );
        assert_eq!(
            errors.first().unwrap().error,
            Error::UnknownProperty {
                key: "bogus_key".to_string()
            }
        );
    }

    #[test]
    fn test_defaults_and_synthesis() {
        let (out, errors) = run(&task_schema(), json!({"name": "t1", "cron": "0 0 * * *"}));
        assert!(errors.is_empty(), "{errors}");

        assert_eq!(
            out,
            json!({
                "name": "t1",
                "cron": "0 0 * * *",
                "max_retries": 2,
                "retry_delay": 10,
                "modifiers": {},
                "result": {"metrics": "metric"},
            })
        );
    }

    #[test]
    fn test_union_branches() {
        for (metrics, ok) in [
            (json!(null), true),
            (json!("metric"), true),
            (json!(["a", "b"]), true),
            (json!(42), false),
        ] {
            let (_, errors) = run(
                &task_schema(),
                json!({"name": "t1", "cron": "0 0 * * *", "result": {"metrics": metrics}}),
            );
            assert_eq!(errors.is_empty(), ok, "metrics {metrics:?}: {errors}");
        }
    }

    #[test]
    fn test_union_error_attribution() {
        // The list branch scores highest and contributes the reported error.
        let schema = Schema::Union(vec![Schema::Str, Schema::list_of(Schema::Int)]);
        let (_, errors) = run(&schema, json!([1, "two", 3]));

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.first().unwrap().path, "[1]");
    }

    #[test]
    fn test_scoped_paths() {
        let schema = Schema::object(vec![Property::required(
            "inputs",
            Schema::list_of(Schema::object(vec![Property::required(
                "tasks",
                Schema::list_of(task_schema()),
            )])),
        )]);

        let (_, errors) = run(
            &schema,
            json!({"inputs": [{"tasks": [{"name": "t1", "cronn": "0 0 * * *"}]}]}),
        );

        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["[inputs][0][tasks][0]", "[inputs][0][tasks][0]"]);
    }

    #[test]
    fn test_validation_idempotence() {
        let doc = json!({"name": "t1", "cron": "0 0 * * *", "retry_delay": "5m"});

        let (once, errors) = run(&task_schema(), doc);
        assert!(errors.is_empty(), "{errors}");

        let (twice, errors) = run(&task_schema(), once.clone());
        assert!(errors.is_empty(), "{errors}");
        assert_eq!(once, twice);
    }
}

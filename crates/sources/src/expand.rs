use serde_json::Value;
use std::collections::BTreeMap;
use validation::{Error, Errors, Scope};

/// Expand `repeat_for` on every task of the composed document.
///
/// Each task carrying `repeat_for` is replaced by one clone per index of
/// its (equal-length) value lists. Within a clone, `$var` is substituted in
/// every string field of the task — params included — and `$i` becomes the
/// stringified index. A task whose lists disagree on length is recorded as
/// an error and dropped.
pub fn expand_repeats(doc: &mut Value, errors: &mut Errors) {
    let root = Scope::root();
    let scope = root.push_prop("inputs");

    let Some(inputs) = doc.get_mut("inputs").and_then(Value::as_array_mut) else {
        return;
    };
    for (index, input) in inputs.iter_mut().enumerate() {
        let scope = scope.push_item(index);
        let scope = scope.push_prop("tasks");

        let Some(tasks) = input.get_mut("tasks").and_then(Value::as_array_mut) else {
            continue;
        };
        let mut expanded = Vec::with_capacity(tasks.len());
        for (index, task) in tasks.drain(..).enumerate() {
            let scope = scope.push_item(index);
            expanded.extend(expand_task(scope, task, errors));
        }
        *tasks = expanded;
    }
}

fn expand_task(scope: Scope<'_>, task: Value, errors: &mut Errors) -> Vec<Value> {
    // Malformed tasks pass through for strict validation to report.
    let Value::Object(mut task) = task else {
        return vec![task];
    };
    let Some(repeat) = task.remove("repeat_for") else {
        return vec![Value::Object(task)];
    };

    let scope = scope.push_prop("repeat_for");
    let Value::Object(repeat) = repeat else {
        errors.push(
            scope,
            Error::TypeMismatch {
                expected: "a map of variables to value lists",
                actual: "another shape",
            },
        );
        return Vec::new();
    };

    let mut variables = Vec::with_capacity(repeat.len());
    for (variable, values) in repeat {
        match values {
            Value::Array(values) => variables.push((variable, values)),
            _ => {
                errors.push(
                    scope,
                    Error::TypeMismatch {
                        expected: "a list of values",
                        actual: "another shape",
                    },
                );
                return Vec::new();
            }
        }
    }

    let expect = variables.first().map(|(_, v)| v.len()).unwrap_or(0);
    for (variable, values) in &variables {
        if values.len() != expect {
            errors.push(
                scope,
                Error::RepeatLength {
                    variable: variable.clone(),
                    expect,
                    actual: values.len(),
                },
            );
            return Vec::new();
        }
    }

    (0..expect)
        .map(|index| {
            let mut substitutions = BTreeMap::new();
            substitutions.insert("i".to_string(), index.to_string());
            for (variable, values) in &variables {
                substitutions.insert(variable.clone(), render(&values[index]));
            }

            // Longer variables substitute first, so $table survives a
            // sibling named $t.
            let mut ordered: Vec<(&String, &String)> = substitutions.iter().collect();
            ordered.sort_by_key(|(variable, _)| std::cmp::Reverse(variable.len()));

            substitute(Value::Object(task.clone()), &ordered)
        })
        .collect()
}

fn substitute(value: Value, ordered: &[(&String, &String)]) -> Value {
    match value {
        Value::String(mut s) => {
            for (variable, replacement) in ordered {
                s = s.replace(&format!("${variable}"), replacement);
            }
            Value::String(s)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| substitute(item, ordered))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, substitute(item, ordered)))
                .collect(),
        ),
        other => other,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

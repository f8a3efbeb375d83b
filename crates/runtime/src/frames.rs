use chrono::{DateTime, Utc};
use models::{
    Metric, MetricFrame, Modifiers, Record, RecordValue, Scalar, TaskDef, ATTR_METRIC_FIELD_NAME,
};
use std::collections::BTreeMap;

/// FrameError is a configuration-level projection failure: the fire is
/// dropped without retry.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("metric field {key:?} is missing from the record")]
    MissingField { key: String },
    #[error("selector pattern {pattern:?} matched no record fields")]
    NoMatch { pattern: String },
    #[error("{pattern:?} is not a valid glob pattern ({detail})")]
    BadPattern { pattern: String, detail: String },
    #[error("metric field {key:?} holds {kind}, which cannot be a metric value")]
    InvalidKind { key: String, kind: &'static str },
    #[error("metric and attribute selectors both matched {key:?}")]
    Overlap { key: String },
    #[error("the task selects no metrics, which requires the allow_none_metric setting")]
    NoneNotAllowed,
}

/// Build a metric frame from an input's records.
///
/// Records flatten lazily through `separator`; metric and attribute
/// selectors expand over the flattened keys (glob patterns allowed); and
/// each resolved metric path emits one metric carrying the selected
/// attributes, the task's static attributes (which win on collision), and
/// its own flattened path under `metric_field_name`. All metrics share the
/// modified fire instant.
pub fn build_frame(
    task: &TaskDef,
    separator: &str,
    allow_none_metric: bool,
    records: Vec<Record>,
    fired_at: DateTime<Utc>,
) -> Result<MetricFrame, FrameError> {
    let timestamp = apply_modifiers(fired_at, &task.modifiers);
    let mut metrics = Vec::new();

    for record in &records {
        let flattened = flatten(record, separator);

        let Some(entries) = task.result.metrics.entries() else {
            if !allow_none_metric {
                return Err(FrameError::NoneNotAllowed);
            }
            // No metric values: the whole record rides as attributes of a
            // single value-less metric.
            let mut attributes: BTreeMap<String, Scalar> = flattened
                .iter()
                .map(|(key, scalar)| (key.clone(), (*scalar).clone()))
                .collect();
            attributes.extend(
                task.static_attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            metrics.push(Metric {
                name: task.name.to_string(),
                value: None,
                attributes,
            });
            continue;
        };

        let metric_keys = resolve_selector(&entries, &flattened)?;
        let attribute_keys = match &task.result.attributes {
            Some(selector) => {
                let keys = resolve_selector(&selector.entries(), &flattened)?;
                if let Some(overlap) = keys.iter().find(|k| metric_keys.iter().any(|m| m == *k)) {
                    return Err(FrameError::Overlap {
                        key: overlap.clone(),
                    });
                }
                keys
            }
            // Unselected fields become attributes.
            None => flattened
                .iter()
                .map(|(key, _)| key.clone())
                .filter(|key| !metric_keys.contains(key))
                .collect(),
        };

        let lookup =
            |key: &str| flattened.iter().find(|(k, _)| k.as_str() == key).map(|(_, s)| *s);

        for key in &metric_keys {
            let value = lookup(key).unwrap_or(&Scalar::Null);
            if !value.is_metric_value() {
                return Err(FrameError::InvalidKind {
                    key: key.clone(),
                    kind: value.kind(),
                });
            }

            let mut attributes: BTreeMap<String, Scalar> = attribute_keys
                .iter()
                .filter_map(|k| lookup(k).map(|s| (k.clone(), s.clone())))
                .collect();
            attributes.extend(
                task.static_attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            attributes.insert(
                ATTR_METRIC_FIELD_NAME.to_string(),
                Scalar::String(key.clone()),
            );

            let leaf = key.rsplit(separator).next().unwrap_or(key);
            metrics.push(Metric {
                name: format!("{}{}{}", task.name, separator, leaf),
                value: Some(value.clone()),
                attributes,
            });
        }
    }

    Ok(MetricFrame::new(task.name.as_str(), timestamp, metrics))
}

/// Resolve selector entries against a record's flattened keys: literal keys
/// must exist, patterns must match at least once, and the expansion order
/// is selector order crossed with flattened-key order, deduplicated.
fn resolve_selector(
    entries: &[&str],
    flattened: &[(String, &Scalar)],
) -> Result<Vec<String>, FrameError> {
    let mut out: Vec<String> = Vec::new();

    for entry in entries {
        if is_pattern(entry) {
            let pattern =
                glob::Pattern::new(entry).map_err(|err| FrameError::BadPattern {
                    pattern: entry.to_string(),
                    detail: err.to_string(),
                })?;

            let mut matched = false;
            for (key, _) in flattened {
                if pattern.matches(key) {
                    matched = true;
                    if !out.contains(key) {
                        out.push(key.clone());
                    }
                }
            }
            if !matched {
                return Err(FrameError::NoMatch {
                    pattern: entry.to_string(),
                });
            }
        } else {
            if !flattened.iter().any(|(key, _)| key.as_str() == *entry) {
                return Err(FrameError::MissingField {
                    key: entry.to_string(),
                });
            }
            if !out.iter().any(|key| key.as_str() == *entry) {
                out.push(entry.to_string());
            }
        }
    }
    Ok(out)
}

fn is_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Flatten a record's nested maps into dotted leaf paths, in key order.
fn flatten<'r>(record: &'r Record, separator: &str) -> Vec<(String, &'r Scalar)> {
    fn walk<'r>(
        prefix: Option<&str>,
        map: &'r BTreeMap<String, RecordValue>,
        separator: &str,
        out: &mut Vec<(String, &'r Scalar)>,
    ) {
        for (key, value) in map {
            let path = match prefix {
                Some(prefix) => format!("{prefix}{separator}{key}"),
                None => key.clone(),
            };
            match value {
                RecordValue::Scalar(scalar) => out.push((path, scalar)),
                RecordValue::Map(nested) => walk(Some(&path), nested, separator, out),
            }
        }
    }

    let mut out = Vec::new();
    walk(None, record, separator, &mut out);
    out
}

/// Compute a frame timestamp: floor the base instant to `time_modulus`
/// (counting from the epoch), then add the signed `time_offset`. Without
/// modifiers the base instant passes through unchanged.
pub fn apply_modifiers(base: DateTime<Utc>, modifiers: &Modifiers) -> DateTime<Utc> {
    let mut instant = base;

    if let Some(modulus) = &modifiers.time_modulus {
        let m = modulus.as_secs() as i64;
        if m > 0 {
            let secs = instant.timestamp();
            let floored = secs - secs.rem_euclid(m);
            instant = DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(instant);
        }
    }
    if let Some(offset) = &modifiers.time_offset {
        instant = instant + offset.delta();
    }
    instant
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;
    use models::{TimePeriod, TimeShift};
    use quickcheck_macros::quickcheck;

    fn task(json: &str) -> TaskDef {
        serde_json::from_str(json).unwrap()
    }

    fn record(json: &str) -> Record {
        serde_json::from_str(json).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap()
    }

    #[test]
    fn test_explicit_selectors() {
        let task = task(
            r#"{"name": "t", "cron": "0 0 * * *",
                "result": {"metrics": ["a", "b"], "attributes": ["c", "d"]}}"#,
        );
        let records = vec![record(r#"{"a": 4, "b": 9, "c": 3, "d": 6, "e": 1}"#)];

        let frame = build_frame(&task, ".", false, records, now()).unwrap();
        assert_eq!(frame.len(), 2);

        let expect_attrs = |field: &str| {
            BTreeMap::from([
                ("c".to_string(), Scalar::Int(3)),
                ("d".to_string(), Scalar::Int(6)),
                (
                    ATTR_METRIC_FIELD_NAME.to_string(),
                    Scalar::String(field.to_string()),
                ),
            ])
        };
        assert_eq!(frame.metrics()[0].name, "t.a");
        assert_eq!(frame.metrics()[0].value, Some(Scalar::Int(4)));
        assert_eq!(frame.metrics()[0].attributes, expect_attrs("a"));
        assert_eq!(frame.metrics()[1].name, "t.b");
        assert_eq!(frame.metrics()[1].value, Some(Scalar::Int(9)));
        assert_eq!(frame.metrics()[1].attributes, expect_attrs("b"));
    }

    #[test]
    fn test_nested_pattern_with_default_attributes() {
        let task = task(
            r#"{"name": "t", "cron": "0 0 * * *",
                "result": {"metrics": "_source.*"}}"#,
        );
        let records = vec![record(r#"{"_source": {"x": 1, "y": 2}, "other": 9}"#)];

        let frame = build_frame(&task, ".", false, records, now()).unwrap();
        assert_eq!(frame.len(), 2);

        let names: Vec<_> = frame.metrics().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["t.x", "t.y"]);

        for (metric, field) in frame.metrics().iter().zip(["_source.x", "_source.y"]) {
            assert_eq!(
                metric.attributes,
                BTreeMap::from([
                    ("other".to_string(), Scalar::Int(9)),
                    (
                        ATTR_METRIC_FIELD_NAME.to_string(),
                        Scalar::String(field.to_string()),
                    ),
                ])
            );
        }
    }

    #[test]
    fn test_static_attributes_win() {
        let task = task(
            r#"{"name": "t", "cron": "0 0 * * *",
                "result": {"metrics": "a"},
                "static_attributes": {"env": "prod", "b": "static"}}"#,
        );
        let records = vec![record(r#"{"a": 1, "b": "recorded"}"#)];

        let frame = build_frame(&task, ".", false, records, now()).unwrap();
        let attrs = &frame.metrics()[0].attributes;
        assert_eq!(attrs["env"], Scalar::String("prod".to_string()));
        assert_eq!(attrs["b"], Scalar::String("static".to_string()));
    }

    #[test]
    fn test_none_selector_rides_attributes() {
        let task = task(
            r#"{"name": "t", "cron": "0 0 * * *", "result": {"metrics": null}}"#,
        );
        let records = vec![record(r#"{"a": 1, "b": "two"}"#)];

        let err = build_frame(&task, ".", false, records.clone(), now()).unwrap_err();
        assert_eq!(err, FrameError::NoneNotAllowed);

        let frame = build_frame(&task, ".", true, records, now()).unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.metrics()[0].value, None);
        assert_eq!(
            frame.metrics()[0].attributes,
            BTreeMap::from([
                ("a".to_string(), Scalar::Int(1)),
                ("b".to_string(), Scalar::String("two".to_string())),
            ])
        );
    }

    #[test]
    fn test_selector_failures() {
        let records = || vec![record(r#"{"a": 1, "s": "text"}"#)];

        let missing = task(
            r#"{"name": "t", "cron": "0 0 * * *", "result": {"metrics": "absent"}}"#,
        );
        assert_eq!(
            build_frame(&missing, ".", false, records(), now()).unwrap_err(),
            FrameError::MissingField {
                key: "absent".to_string()
            }
        );

        let unmatched = task(
            r#"{"name": "t", "cron": "0 0 * * *", "result": {"metrics": "absent.*"}}"#,
        );
        assert_eq!(
            build_frame(&unmatched, ".", false, records(), now()).unwrap_err(),
            FrameError::NoMatch {
                pattern: "absent.*".to_string()
            }
        );

        let wrong_kind = task(
            r#"{"name": "t", "cron": "0 0 * * *", "result": {"metrics": "s"}}"#,
        );
        assert_eq!(
            build_frame(&wrong_kind, ".", false, records(), now()).unwrap_err(),
            FrameError::InvalidKind {
                key: "s".to_string(),
                kind: "string"
            }
        );

        let overlapping = task(
            r#"{"name": "t", "cron": "0 0 * * *",
                "result": {"metrics": "a", "attributes": ["a"]}}"#,
        );
        assert_eq!(
            build_frame(&overlapping, ".", false, records(), now()).unwrap_err(),
            FrameError::Overlap {
                key: "a".to_string()
            }
        );
    }

    #[test]
    fn test_record_list_concatenates_in_order() {
        let task = task(r#"{"name": "t", "cron": "0 0 * * *", "result": {"metrics": "m"}}"#);
        let records = vec![record(r#"{"m": 1}"#), record(r#"{"m": 2}"#)];

        let frame = build_frame(&task, ".", false, records, now()).unwrap();
        let values: Vec<_> = frame.metrics().iter().map(|m| m.value.clone()).collect();
        assert_eq!(values, vec![Some(Scalar::Int(1)), Some(Scalar::Int(2))]);
    }

    #[test]
    fn test_modifier_application_order() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap();
        let modifiers = Modifiers {
            time_modulus: Some(TimePeriod::from_secs(3600)),
            time_offset: Some(TimeShift::from_secs(-300)),
        };

        // Floored to the hour, then shifted back five minutes.
        let expect = Utc.with_ymd_and_hms(2024, 5, 1, 11, 55, 0).unwrap();
        assert_eq!(apply_modifiers(base, &modifiers), expect);

        // Without modifiers the base instant passes through.
        assert_eq!(apply_modifiers(base, &Modifiers::default()), base);
    }

    #[quickcheck]
    fn prop_timestamp_modifier_law(base: u32, modulus: u32, offset: i16) -> bool {
        let base = base as i64;
        let modulus = (modulus % 100_000 + 1) as u64;
        let offset = offset as i64;

        let instant = DateTime::<Utc>::from_timestamp(base, 0).unwrap();
        let modifiers = Modifiers {
            time_modulus: Some(TimePeriod::from_secs(modulus)),
            time_offset: Some(TimeShift::from_secs(offset)),
        };

        let expect = (base - base.rem_euclid(modulus as i64)) + offset;
        apply_modifiers(instant, &modifiers).timestamp() == expect
    }
}

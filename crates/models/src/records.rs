use super::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// RecordValue is a scalar field, or a nested map of further record values.
/// Nested maps are flattened by the frame builder through the configured
/// attribute separator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RecordValue {
    Scalar(Scalar),
    Map(BTreeMap<String, RecordValue>),
}

impl RecordValue {
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            RecordValue::Scalar(s) => Some(s),
            RecordValue::Map(_) => None,
        }
    }
}

impl<T: Into<Scalar>> From<T> for RecordValue {
    fn from(v: T) -> Self {
        RecordValue::Scalar(v.into())
    }
}

/// Record is a single row produced by an input: field name to value.
pub type Record = BTreeMap<String, RecordValue>;

/// Records is the result shape of one input invocation:
/// a single record, or an ordered list of records.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Records {
    One(Record),
    Many(Vec<Record>),
}

impl Records {
    pub fn into_vec(self) -> Vec<Record> {
        match self {
            Records::One(record) => vec![record],
            Records::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Records::One(_) => 1,
            Records::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_parsing() {
        let record: Record =
            serde_json::from_str(r#"{"a": 4, "b": {"x": 1.5, "y": "deep"}, "c": true}"#).unwrap();

        assert_eq!(record["a"], RecordValue::from(4));
        assert_eq!(record["c"], RecordValue::from(true));

        let RecordValue::Map(nested) = &record["b"] else {
            panic!("b must parse as a nested map");
        };
        assert_eq!(nested["x"], RecordValue::from(1.5));
        assert_eq!(nested["y"], RecordValue::from("deep"));
    }

    #[test]
    fn test_records_shapes() {
        let one: Records = serde_json::from_str(r#"{"a": 1}"#).unwrap();
        assert_eq!(one.len(), 1);

        let many: Records = serde_json::from_str(r#"[{"a": 1}, {"a": 2}]"#).unwrap();
        assert_eq!(many.len(), 2);

        // Record order of a list is preserved.
        let records = many.into_vec();
        assert_eq!(records[0]["a"], RecordValue::from(1));
        assert_eq!(records[1]["a"], RecordValue::from(2));
    }
}

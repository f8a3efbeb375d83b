use serde_json::{json, Value};

/// Schema is a declarative description of a configuration shape,
/// interpreted by the walking validator. Module implementations compose
/// these nodes to describe their connection and parameter documents.
#[derive(Debug, Clone)]
pub enum Schema {
    /// A string.
    Str,
    /// An integer.
    Int,
    /// A float; integers are accepted and widen.
    Float,
    /// A boolean.
    Bool,
    /// Any non-container value.
    Scalar,
    /// An explicit null.
    Null,
    /// An unsigned time period: seconds, or `<n>{s|m|h|d}`.
    Duration,
    /// A signed time period, accepting a leading `-`.
    SignedDuration,
    /// A five-field crontab expression.
    Cron,
    /// Anything at all, left untouched.
    Any,
    /// An ordered list of homogeneous items.
    List(Box<Schema>),
    /// A free-form map of string keys to homogeneous values.
    Dict(Box<Schema>),
    /// A map with a fixed property set.
    Object(Vec<Property>),
    /// One of several alternative shapes.
    Union(Vec<Schema>),
}

/// Property is one key of an Object schema. Optional properties may carry a
/// default which the validator writes into the normalized document.
#[derive(Debug, Clone)]
pub struct Property {
    pub key: String,
    pub schema: Schema,
    pub required: bool,
    pub default: Option<Value>,
}

impl Property {
    pub fn required(key: impl Into<String>, schema: Schema) -> Self {
        Self {
            key: key.into(),
            schema,
            required: true,
            default: None,
        }
    }

    pub fn optional(key: impl Into<String>, schema: Schema) -> Self {
        Self {
            key: key.into(),
            schema,
            required: false,
            default: None,
        }
    }

    pub fn with_default(key: impl Into<String>, schema: Schema, default: Value) -> Self {
        Self {
            key: key.into(),
            schema,
            required: false,
            default: Some(default),
        }
    }

    /// An example valid value, used alongside unknown-key suggestions.
    pub fn example(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.schema.example())
    }
}

impl Schema {
    pub fn object(props: Vec<Property>) -> Schema {
        Schema::Object(props)
    }

    /// An empty object whose validator accepts nothing but `{}`.
    pub fn empty_object() -> Schema {
        Schema::Object(Vec::new())
    }

    pub fn list_of(item: Schema) -> Schema {
        Schema::List(Box::new(item))
    }

    pub fn dict_of(value: Schema) -> Schema {
        Schema::Dict(Box::new(value))
    }

    /// The kind of this schema, as rendered in mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Schema::Str => "a string",
            Schema::Int => "an integer",
            Schema::Float => "a number",
            Schema::Bool => "a boolean",
            Schema::Scalar => "a scalar",
            Schema::Null => "null",
            Schema::Duration => "a time period",
            Schema::SignedDuration => "a signed time period",
            Schema::Cron => "a cron expression",
            Schema::Any => "any value",
            Schema::List(_) => "a list",
            Schema::Dict(_) => "a map",
            Schema::Object(_) => "a map",
            Schema::Union(_) => "one of several shapes",
        }
    }

    /// An example valid value of this schema, preferring declared defaults.
    pub fn example(&self) -> Value {
        match self {
            Schema::Str => json!("text"),
            Schema::Int => json!(42),
            Schema::Float => json!(1.5),
            Schema::Bool => json!(true),
            Schema::Scalar => json!(42),
            Schema::Null => Value::Null,
            Schema::Duration => json!("30s"),
            Schema::SignedDuration => json!("-5m"),
            Schema::Cron => json!("0 0 * * *"),
            Schema::Any => Value::Null,
            Schema::List(item) => json!([item.example()]),
            Schema::Dict(value) => json!({ "key": value.example() }),
            Schema::Object(props) => self.synthesized().unwrap_or_else(|| {
                let map = props
                    .iter()
                    .map(|p| (p.key.clone(), p.example()))
                    .collect::<serde_json::Map<_, _>>();
                Value::Object(map)
            }),
            Schema::Union(branches) => branches
                .first()
                .map(Schema::example)
                .unwrap_or(Value::Null),
        }
    }

    /// The document synthesized for this schema when its value is omitted:
    /// an Object all of whose properties are optional materializes from its
    /// defaults, and a Union defers to its first synthesizable branch.
    pub fn synthesized(&self) -> Option<Value> {
        match self {
            Schema::Object(props) => {
                if props.iter().any(|p| p.required) {
                    return None;
                }
                let mut map = serde_json::Map::new();
                for prop in props {
                    if let Some(default) = &prop.default {
                        map.insert(prop.key.clone(), default.clone());
                    } else if let Some(synthesized) = prop.schema.synthesized() {
                        map.insert(prop.key.clone(), synthesized);
                    }
                }
                Some(Value::Object(map))
            }
            Schema::Union(branches) => branches.iter().find_map(Schema::synthesized),
            _ => None,
        }
    }

    /// How strongly a value resembles this schema, measured in matched
    /// required keys. Union resolution picks the branch with the highest
    /// score.
    pub fn match_score(&self, value: &Value) -> usize {
        match (self, value) {
            (Schema::Object(props), Value::Object(map)) => props
                .iter()
                .filter(|p| p.required && map.contains_key(&p.key))
                .count(),
            (Schema::Null, Value::Null) => 1,
            (Schema::Str | Schema::Cron, Value::String(_)) => 1,
            (Schema::Int | Schema::Float, Value::Number(_)) => 1,
            (Schema::Bool, Value::Bool(_)) => 1,
            (Schema::Duration | Schema::SignedDuration, Value::Number(_) | Value::String(_)) => 1,
            (Schema::Scalar, v) if !v.is_array() && !v.is_object() => 1,
            (Schema::List(_), Value::Array(_)) => 1,
            (Schema::Dict(_), Value::Object(_)) => 1,
            (Schema::Any, _) => 1,
            (Schema::Union(branches), v) => branches
                .iter()
                .map(|b| b.match_score(v))
                .max()
                .unwrap_or(0),
            _ => 0,
        }
    }
}

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar is a single tagged value: the permitted kinds of metric values,
/// attribute values, and record fields.
///
/// Complex values round-trip as `{re, im}` maps; everything else maps onto
/// the corresponding JSON scalar.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex64),
    String(String),
}

impl Scalar {
    /// The kind of this scalar, as rendered in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "boolean",
            Scalar::Int(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Complex(_) => "complex",
            Scalar::String(_) => "string",
        }
    }

    /// Whether this scalar may be used as a metric value.
    /// Strings and nulls are attribute-only kinds.
    pub fn is_metric_value(&self) -> bool {
        matches!(
            self,
            Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_) | Scalar::Complex(_)
        )
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => b.fmt(f),
            Scalar::Int(i) => i.fmt(f),
            Scalar::Float(v) => v.fmt(f),
            Scalar::Complex(c) => write!(f, "{}+{}i", c.re, c.im),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<Complex64> for Scalar {
    fn from(c: Complex64) -> Self {
        Scalar::Complex(c)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scalar_round_trips() {
        for (json, expect) in [
            ("null", Scalar::Null),
            ("true", Scalar::Bool(true)),
            ("42", Scalar::Int(42)),
            ("4.5", Scalar::Float(4.5)),
            (r#"{"re":1.0,"im":-2.0}"#, Scalar::Complex(Complex64::new(1.0, -2.0))),
            (r#""hello""#, Scalar::String("hello".to_string())),
        ] {
            let parsed: Scalar = serde_json::from_str(json).unwrap();
            assert_eq!(parsed, expect);

            let again: Scalar =
                serde_json::from_str(&serde_json::to_string(&parsed).unwrap()).unwrap();
            assert_eq!(again, expect);
        }
    }

    #[test]
    fn test_metric_value_kinds() {
        assert!(Scalar::Int(1).is_metric_value());
        assert!(Scalar::Float(0.5).is_metric_value());
        assert!(Scalar::Bool(false).is_metric_value());
        assert!(Scalar::Complex(Complex64::new(0.0, 1.0)).is_metric_value());
        assert!(!Scalar::String("nope".into()).is_metric_value());
        assert!(!Scalar::Null.is_metric_value());
    }
}

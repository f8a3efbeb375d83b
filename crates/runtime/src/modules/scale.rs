use crate::{Lifecycle, TransformError, TransformModule};
use async_trait::async_trait;
use models::{Metric, Scalar};
use serde_json::Value;

/// ScaleTransform multiplies numeric metric values in place. Integer values
/// widen to floats; booleans and value-less metrics pass through untouched.
pub struct ScaleTransform {
    factor: f64,
}

impl ScaleTransform {
    pub fn from_params(params: &Value) -> anyhow::Result<Self> {
        let factor = params
            .get("factor")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        Ok(Self { factor })
    }
}

impl Lifecycle for ScaleTransform {}

#[async_trait]
impl TransformModule for ScaleTransform {
    async fn apply(&self, metrics: &mut [Metric]) -> Result<(), TransformError> {
        for metric in metrics.iter_mut() {
            metric.value = match metric.value.take() {
                Some(Scalar::Int(v)) => Some(Scalar::Float(v as f64 * self.factor)),
                Some(Scalar::Float(v)) => Some(Scalar::Float(v * self.factor)),
                Some(Scalar::Complex(c)) => Some(Scalar::Complex(c * self.factor)),
                other => other,
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_scales_numeric_values_in_place() {
        let scale = ScaleTransform::from_params(&json!({"factor": 2.0})).unwrap();

        let mut metrics = vec![
            Metric {
                name: "t.a".to_string(),
                value: Some(Scalar::Int(4)),
                attributes: BTreeMap::new(),
            },
            Metric {
                name: "t.b".to_string(),
                value: Some(Scalar::Bool(true)),
                attributes: BTreeMap::new(),
            },
        ];
        scale.apply(&mut metrics).await.unwrap();

        assert_eq!(metrics[0].value, Some(Scalar::Float(8.0)));
        assert_eq!(metrics[1].value, Some(Scalar::Bool(true)));
    }
}

use crate::{InputModule, Lifecycle};
use anyhow::Context;
use async_trait::async_trait;
use models::Records;
use serde_json::Value;

/// ConstantInput replays the records declared in its task parameters.
/// Useful for fixtures, smoke flows, and tests.
pub struct ConstantInput;

impl Lifecycle for ConstantInput {}

#[async_trait]
impl InputModule for ConstantInput {
    async fn run(&self, params: &Value) -> anyhow::Result<Records> {
        let records = params
            .get("records")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::from_value(records).context("records must be a record or a list of records")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replays_declared_records() {
        let records = ConstantInput
            .run(&json!({"records": [{"metric": 4}, {"metric": 9}]}))
            .await
            .unwrap();
        assert_eq!(records.len(), 2);

        let records = ConstantInput.run(&json!({"records": {"metric": 1}})).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}

//! `generate_random_number`: demo tool for the hypothesis chat agent.

use async_trait::async_trait;
use rand::Rng;

use crate::{Tool, ToolContext, ToolOutput};

pub struct RandomNumberTool;

/// Uniform integer in `1..=3`.
pub fn generate_random_number() -> u32 {
    rand::rng().random_range(1..=3)
}

#[async_trait]
impl Tool for RandomNumberTool {
    fn name(&self) -> &str {
        "generate_random_number"
    }

    fn description(&self) -> &str {
        "Generate a random number between 1 and 3."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _context: &ToolContext,
    ) -> anyhow::Result<ToolOutput> {
        Ok(ToolOutput::json(generate_random_number().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range() {
        for _ in 0..100 {
            assert!((1..=3).contains(&generate_random_number()));
        }
    }

    #[tokio::test]
    async fn test_execute_ignores_params() {
        let output = RandomNumberTool
            .execute(serde_json::json!({"unused": true}), &ToolContext::default())
            .await
            .unwrap();
        let n = output.content.as_u64().unwrap();
        assert!((1..=3).contains(&n));
    }
}

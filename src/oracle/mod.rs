//! Decision oracle: the model-backed function consulted once per stage.
//!
//! Every stage sends a [`DecisionRequest`] carrying its own system prompt,
//! a rendered user prompt and the JSON Schema the answer must follow. The
//! oracle returns raw JSON; [`decide`] deserializes it into the stage's
//! decision type so schema mismatches surface as oracle failures.

pub mod openai;
pub mod prompts;
pub mod schema;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GraphReaderError, Result};

pub use openai::ChatOracle;
pub use schema::{
    AnswerDecision, ChunkReadDecision, Decision, FactCheckDecision, NeighborDecision, PlanDecision, ScoredNode,
    SeedDecision,
};

/// The six decision stages of a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RationalPlan,
    InitialNodeSelection,
    AtomicFactCheck,
    ChunkRead,
    NeighborSelect,
    AnswerReasoning,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::RationalPlan => "rational_plan",
            Stage::InitialNodeSelection => "initial_node_selection",
            Stage::AtomicFactCheck => "atomic_fact_check",
            Stage::ChunkRead => "chunk_read",
            Stage::NeighborSelect => "neighbor_select",
            Stage::AnswerReasoning => "answer_reasoning",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One oracle call.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub stage: Stage,
    pub system_prompt: String,
    pub user_prompt: String,
    /// JSON Schema the response object must satisfy.
    pub schema: serde_json::Value,
}

pub trait DecisionOracle: Send + Sync {
    /// Return a JSON object matching `request.schema`.
    fn decide<'a>(&'a self, request: &'a DecisionRequest) -> BoxFuture<'a, Result<serde_json::Value>>;
}

/// Build the request for decision type `D`, call the oracle and deserialize.
pub async fn decide<D: Decision>(oracle: &dyn DecisionOracle, user_prompt: String) -> Result<D> {
    decide_with(oracle, prompts::system_prompt(D::STAGE), user_prompt).await
}

/// Like [`decide`] with an explicit system prompt.
pub async fn decide_with<D: Decision>(
    oracle: &dyn DecisionOracle,
    system_prompt: String,
    user_prompt: String,
) -> Result<D> {
    let request = DecisionRequest {
        stage: D::STAGE,
        system_prompt,
        user_prompt,
        schema: D::schema(),
    };

    let start = std::time::Instant::now();
    let value = oracle.decide(&request).await?;
    log::debug!("Oracle decided {} in {:?}", D::STAGE, start.elapsed());

    serde_json::from_value(value).map_err(|e| {
        GraphReaderError::Oracle(format!("{} response does not match its schema: {}", D::STAGE, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedOracle(serde_json::Value);

    impl DecisionOracle for FixedOracle {
        fn decide<'a>(&'a self, request: &'a DecisionRequest) -> BoxFuture<'a, Result<serde_json::Value>> {
            assert_eq!(request.schema["type"], "object");
            Box::pin(async move { Ok(self.0.clone()) })
        }
    }

    #[tokio::test]
    async fn test_decide_deserializes_stage_type() {
        let oracle = FixedOracle(json!({"rational_plan": "Find X, then X's friend."}));
        let plan: PlanDecision = decide(&oracle, "Question: who?".to_string()).await.unwrap();
        assert_eq!(plan.rational_plan, "Find X, then X's friend.");
    }

    #[tokio::test]
    async fn test_schema_mismatch_is_oracle_failure() {
        let oracle = FixedOracle(json!({"plan": "wrong field"}));
        let err = decide::<PlanDecision>(&oracle, String::new()).await.unwrap_err();
        assert!(matches!(err, GraphReaderError::Oracle(_)));
        assert!(err.to_string().contains("rational_plan"));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::AtomicFactCheck.to_string(), "atomic_fact_check");
        assert_eq!(serde_json::to_value(Stage::ChunkRead).unwrap(), "chunk_read");
    }
}

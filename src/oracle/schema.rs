//! Typed stage decisions and the JSON Schemas sent alongside each request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::Stage;

/// A stage's structured oracle result.
pub trait Decision: DeserializeOwned + Send {
    const STAGE: Stage;

    /// Strict JSON Schema for the result object.
    fn schema() -> Value;
}

const UPDATED_NOTEBOOK: &str =
    "The full notebook rewritten to include any new findings relevant to the question.";
const RATIONAL_NEXT_ACTION: &str =
    "Reasoning about which action to take next, given the question, plan, previous actions and notebook.";

const FACT_CHECK_ACTIONS: &str = "Exactly one of:\n\
    read_chunk(List[ID]): read the text chunks behind atomic facts that may help answer the question.\n\
    stop_and_read_neighbor(): none of the chunks look useful; move on to neighboring nodes.";

const CHUNK_READ_ACTIONS: &str = "Exactly one of:\n\
    search_more(): information needed for the answer is still missing.\n\
    read_previous_chunk(): the preceding chunk likely holds useful information.\n\
    read_subsequent_chunk(): the following chunk likely holds useful information.\n\
    termination(): enough information has been gathered to answer.";

const NEIGHBOR_ACTIONS: &str = "Exactly one of:\n\
    read_neighbor_node(key element of node): explore one neighbor that may hold relevant information.\n\
    termination(): no neighbor is likely to help answer the question.";

fn string_field(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn object_schema(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDecision {
    pub rational_plan: String,
}

impl Decision for PlanDecision {
    const STAGE: Stage = Stage::RationalPlan;

    fn schema() -> Value {
        object_schema(json!({
            "rational_plan": string_field(
                "Step-by-step plan for resolving the question and the key information it needs."
            ),
        }))
    }
}

/// A candidate key element with a relevance score in 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    pub key_element: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedDecision {
    pub initial_nodes: Vec<ScoredNode>,
}

impl Decision for SeedDecision {
    const STAGE: Stage = Stage::InitialNodeSelection;

    fn schema() -> Value {
        let node = object_schema(json!({
            "key_element": string_field("A key element copied verbatim from the provided node list."),
            "score": {
                "type": "integer",
                "description": "Relevance to the answer from 0 (unrelated) to 100 (very likely relevant).",
            },
        }));
        object_schema(json!({
            "initial_nodes": {
                "type": "array",
                "description": "Starting nodes relevant to the question and plan.",
                "items": node,
            },
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckDecision {
    pub updated_notebook: String,
    pub rational_next_action: String,
    pub chosen_action: String,
}

impl Decision for FactCheckDecision {
    const STAGE: Stage = Stage::AtomicFactCheck;

    fn schema() -> Value {
        object_schema(json!({
            "updated_notebook": string_field(UPDATED_NOTEBOOK),
            "rational_next_action": string_field(RATIONAL_NEXT_ACTION),
            "chosen_action": string_field(FACT_CHECK_ACTIONS),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkReadDecision {
    pub updated_notebook: String,
    pub rational_next_action: String,
    pub chosen_action: String,
}

impl Decision for ChunkReadDecision {
    const STAGE: Stage = Stage::ChunkRead;

    fn schema() -> Value {
        object_schema(json!({
            "updated_notebook": string_field(UPDATED_NOTEBOOK),
            "rational_next_action": string_field(RATIONAL_NEXT_ACTION),
            "chosen_action": string_field(CHUNK_READ_ACTIONS),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborDecision {
    pub rational_next_action: String,
    pub chosen_action: String,
}

impl Decision for NeighborDecision {
    const STAGE: Stage = Stage::NeighborSelect;

    fn schema() -> Value {
        object_schema(json!({
            "rational_next_action": string_field(RATIONAL_NEXT_ACTION),
            "chosen_action": string_field(NEIGHBOR_ACTIONS),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDecision {
    pub analyze: String,
    pub final_answer: String,
}

impl Decision for AnswerDecision {
    const STAGE: Stage = Stage::AnswerReasoning;

    fn schema() -> Value {
        object_schema(json!({
            "analyze": string_field("Analysis of every notebook entry leading to the final answer."),
            "final_answer": string_field("Final answer to the question, using all available information."),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_are_strict() {
        for schema in [
            PlanDecision::schema(),
            SeedDecision::schema(),
            FactCheckDecision::schema(),
            ChunkReadDecision::schema(),
            NeighborDecision::schema(),
            AnswerDecision::schema(),
        ] {
            assert_eq!(schema["type"], "object");
            assert_eq!(schema["additionalProperties"], false);
            let properties = schema["properties"].as_object().unwrap();
            let required = schema["required"].as_array().unwrap();
            assert_eq!(properties.len(), required.len());
        }
    }

    #[test]
    fn test_seed_items_are_strict_objects() {
        let schema = SeedDecision::schema();
        let items = &schema["properties"]["initial_nodes"]["items"];
        assert_eq!(items["additionalProperties"], false);
        assert_eq!(items["properties"]["score"]["type"], "integer");
    }

    #[test]
    fn test_action_vocabulary_in_descriptions() {
        let schema = ChunkReadDecision::schema();
        let description = schema["properties"]["chosen_action"]["description"].as_str().unwrap();
        for action in ["search_more()", "read_previous_chunk()", "read_subsequent_chunk()", "termination()"] {
            assert!(description.contains(action), "missing {}", action);
        }
    }

    #[test]
    fn test_seed_decision_parses() {
        let decision: SeedDecision = serde_json::from_str(
            r#"{"initial_nodes": [{"key_element": "Harry Potter", "score": 90}]}"#,
        )
        .unwrap();
        assert_eq!(decision.initial_nodes[0].score, 90);
    }
}

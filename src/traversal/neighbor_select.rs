use crate::error::Result;
use crate::graph::normalize_key_element;
use crate::oracle::prompts::PromptContext;
use crate::oracle::{decide, NeighborDecision, Stage};

use super::action::{parse_action, NeighborAction};
use super::engine::{GraphReader, Transition};
use super::state::TraversalState;

/// Let the oracle pick one neighbor to explore, or stop.
pub(super) async fn run(reader: &GraphReader, state: &mut TraversalState) -> Result<Transition> {
    let neighbors = std::mem::take(&mut state.neighbor_check_queue);

    let prompt = PromptContext::new()
        .field("Question", &state.question)
        .field("Plan", &state.rational_plan)
        .list("Previous actions", &state.previous_actions)
        .field("Notebook", &state.notebook)
        .list("Neighbor nodes", &neighbors)
        .build();
    let decision: NeighborDecision = decide(reader.oracle.as_ref(), prompt).await?;
    log::debug!("Neighbor rationale: {}", decision.rational_next_action);

    let action = match parse_action(&decision.chosen_action).and_then(NeighborAction::try_from) {
        Ok(action) => action,
        Err(e) => {
            state.record("neighbor_select()");
            return Ok(Transition::stall(state, &decision.chosen_action, e));
        }
    };
    log::info!("Chosen action: {:?}", action);

    match action {
        NeighborAction::ReadNeighborNode(key_element) => {
            let id = normalize_key_element(&key_element);
            if !neighbors.contains(&id) {
                log::warn!("Neighbor {:?} was not among the offered nodes", key_element);
            }
            if state.visited_key_elements.contains(&id) {
                log::warn!("Revisiting key element {:?}", id);
            }
            state.record(format!("neighbor_select({})", id));
            state.chosen_action = "read_neighbor_node".to_string();
            state.check_atomic_facts_queue = vec![id];
            Ok(Transition::To(Stage::AtomicFactCheck))
        }
        NeighborAction::Termination => {
            state.record("neighbor_select()");
            state.chosen_action = "termination".to_string();
            Ok(Transition::To(Stage::AnswerReasoning))
        }
    }
}

use std::collections::HashSet;

use crate::error::Result;
use crate::oracle::prompts::PromptContext;
use crate::oracle::{decide, FactCheckDecision, Stage};

use super::action::{parse_action, FactCheckAction};
use super::engine::{GraphReader, Transition};
use super::state::TraversalState;

/// Review the atomic facts of every queued key element at once.
pub(super) async fn run(reader: &GraphReader, state: &mut TraversalState) -> Result<Transition> {
    let key_elements = std::mem::take(&mut state.check_atomic_facts_queue);
    log::debug!("Checking atomic facts of {:?}", key_elements);
    state.visited_key_elements.extend(key_elements.iter().cloned());

    let facts = reader.store.get_atomic_facts(&key_elements).await?;
    let prompt = PromptContext::new()
        .field("Question", &state.question)
        .field("Plan", &state.rational_plan)
        .list("Previous actions", &state.previous_actions)
        .field("Notebook", &state.notebook)
        .list(
            "Atomic facts",
            facts.iter().map(|f| format!("[chunk {}] {}", f.chunk_id, f.text)),
        )
        .build();
    let decision: FactCheckDecision = decide(reader.oracle.as_ref(), prompt).await?;

    state.notebook = decision.updated_notebook;
    state.record(format!("atomic_fact_check([{}])", key_elements.join(", ")));
    log::debug!("Fact check rationale: {}", decision.rational_next_action);

    let action = match parse_action(&decision.chosen_action).and_then(FactCheckAction::try_from) {
        Ok(action) => action,
        Err(e) => return Ok(Transition::stall(state, &decision.chosen_action, e)),
    };
    log::info!("Chosen action: {:?}", action);

    if let FactCheckAction::ReadChunk(requested) = action {
        let chunks = unread_chunks(requested, &state.visited_chunks);
        if !chunks.is_empty() {
            state.chosen_action = "read_chunk".to_string();
            state.check_chunks_queue = chunks;
            return Ok(Transition::To(Stage::ChunkRead));
        }
        log::info!("Every requested chunk was already read, moving to neighbors");
    }

    state.chosen_action = "stop_and_read_neighbor".to_string();
    let neighbors = reader
        .store
        .get_neighbors_by_key_element(&key_elements, reader.config.neighbor_limit)
        .await?;
    state.neighbor_check_queue = neighbors
        .into_iter()
        .filter(|id| !state.visited_key_elements.contains(id))
        .collect();
    log::debug!("Neighbor candidates: {:?}", state.neighbor_check_queue);
    Ok(Transition::To(Stage::NeighborSelect))
}

/// Requested chunk ids in order, without duplicates or chunks already read.
fn unread_chunks(requested: Vec<String>, visited: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    requested
        .into_iter()
        .filter(|id| !visited.contains(id) && seen.insert(id.clone()))
        .collect()
}

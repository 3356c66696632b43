use crate::error::Result;
use crate::graph::Adjacent;
use crate::oracle::prompts::PromptContext;
use crate::oracle::{decide, ChunkReadDecision, Stage};

use super::action::{parse_action, ChunkReadAction};
use super::engine::{GraphReader, Transition};
use super::state::TraversalState;

const MISSING_CHUNK_TEXT: &str = "(chunk not found in the graph)";

/// Read the most recently pushed chunk and follow the oracle's choice.
pub(super) async fn run(reader: &GraphReader, state: &mut TraversalState) -> Result<Transition> {
    let Some(chunk_id) = state.check_chunks_queue.pop() else {
        let action = state.chosen_action.clone();
        return Ok(Transition::Stall {
            action,
            reason: "chunk read entered with an empty chunk queue".to_string(),
        });
    };
    log::debug!("Reading chunk {} ({} stacked)", chunk_id, state.check_chunks_queue.len());
    state.visited_chunks.insert(chunk_id.clone());

    let text = match reader.store.get_chunk(&chunk_id).await? {
        Some(chunk) => chunk.text,
        None => {
            log::warn!("Chunk {} not found", chunk_id);
            MISSING_CHUNK_TEXT.to_string()
        }
    };

    let prompt = PromptContext::new()
        .field("Question", &state.question)
        .field("Plan", &state.rational_plan)
        .list("Previous actions", &state.previous_actions)
        .field("Notebook", &state.notebook)
        .field("Chunk", &text)
        .build();
    let decision: ChunkReadDecision = decide(reader.oracle.as_ref(), prompt).await?;

    state.notebook = decision.updated_notebook;
    state.record(format!("read_chunk([{}])", chunk_id));
    log::debug!("Chunk read rationale: {}", decision.rational_next_action);

    let action = match parse_action(&decision.chosen_action).and_then(ChunkReadAction::try_from) {
        Ok(action) => action,
        Err(e) => return Ok(Transition::stall(state, &decision.chosen_action, e)),
    };
    log::info!("Chosen action: {:?}", action);

    match action {
        ChunkReadAction::Termination => {
            state.chosen_action = "termination".to_string();
            Ok(Transition::To(Stage::AnswerReasoning))
        }
        ChunkReadAction::SearchMore => {
            state.chosen_action = "search_more".to_string();
            continue_or_escalate(reader, state, &decision.rational_next_action).await
        }
        ChunkReadAction::ReadPreviousChunk | ChunkReadAction::ReadSubsequentChunk => {
            let adjacent = if action == ChunkReadAction::ReadPreviousChunk {
                state.chosen_action = "read_previous_chunk".to_string();
                reader.store.get_previous_chunk_id(&chunk_id).await?
            } else {
                state.chosen_action = "read_subsequent_chunk".to_string();
                reader.store.get_subsequent_chunk_id(&chunk_id).await?
            };

            match adjacent {
                Adjacent::Chunk(next) if state.visited_chunks.contains(&next) => {
                    log::debug!("Adjacent chunk {} already read", next);
                }
                Adjacent::Chunk(next) => {
                    state.check_chunks_queue.push(next);
                    return Ok(Transition::To(Stage::ChunkRead));
                }
                Adjacent::Boundary => {
                    log::info!("Chunk {} has no {} neighbor", chunk_id, direction(action));
                }
                Adjacent::Missing => {
                    log::warn!("Chunk {} missing while resolving its {} neighbor", chunk_id, direction(action));
                }
            }
            continue_or_escalate(reader, state, &decision.rational_next_action).await
        }
    }
}

fn direction(action: ChunkReadAction) -> &'static str {
    if action == ChunkReadAction::ReadPreviousChunk {
        "previous"
    } else {
        "subsequent"
    }
}

/// Keep reading stacked chunks; once the stack is empty, search the graph
/// for key elements similar to the oracle's rationale.
async fn continue_or_escalate(
    reader: &GraphReader,
    state: &mut TraversalState,
    rationale: &str,
) -> Result<Transition> {
    if !state.check_chunks_queue.is_empty() {
        return Ok(Transition::To(Stage::ChunkRead));
    }

    log::info!("Chunk stack empty, searching for similar key elements");
    let embedding = reader.embedder.embed(rationale).await?;
    let similar = reader
        .store
        .get_similar_nodes(&embedding, reader.config.similar_nodes_k)
        .await?;
    state.neighbor_check_queue = similar
        .into_iter()
        .map(|node| node.id)
        .filter(|id| !state.visited_key_elements.contains(id))
        .collect();
    state.chosen_action = "search_neighbor".to_string();
    log::debug!("Escalation candidates: {:?}", state.neighbor_check_queue);
    Ok(Transition::To(Stage::NeighborSelect))
}

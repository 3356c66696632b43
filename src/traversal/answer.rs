use crate::error::{GraphReaderError, Result};
use crate::oracle::prompts::PromptContext;
use crate::oracle::{decide, AnswerDecision};

use super::engine::{GraphReader, Transition};
use super::state::TraversalState;

/// Reconcile the notebook into a final answer.
pub(super) async fn run(reader: &GraphReader, state: &mut TraversalState) -> Result<Transition> {
    let prompt = PromptContext::new()
        .field("Question", &state.question)
        .field("Notebook", &state.notebook)
        .build();
    let decision: AnswerDecision = decide(reader.oracle.as_ref(), prompt).await?;

    if decision.final_answer.trim().is_empty() {
        return Err(GraphReaderError::Oracle("answer reasoning returned an empty final answer".to_string()));
    }

    log::info!("Final answer: {}", decision.final_answer);
    state.analysis = decision.analyze;
    state.answer = decision.final_answer;
    state.record("answer_reasoning");
    Ok(Transition::Done)
}

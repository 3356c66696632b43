use crate::error::Result;
use crate::oracle::{decide, prompts::PromptContext, PlanDecision, Stage};

use super::engine::{GraphReader, Transition};
use super::state::TraversalState;

/// Ask for a step-by-step plan. Always advances to seed selection.
pub(super) async fn run(reader: &GraphReader, state: &mut TraversalState) -> Result<Transition> {
    let prompt = PromptContext::new().field("Question", &state.question).build();
    let decision: PlanDecision = decide(reader.oracle.as_ref(), prompt).await?;

    log::info!("Rational plan: {}", decision.rational_plan);
    state.rational_plan = decision.rational_plan;
    state.record("rational_plan");
    Ok(Transition::To(Stage::InitialNodeSelection))
}

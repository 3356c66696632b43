use std::sync::Arc;

use crate::config::TraversalConfig;
use crate::embeddings::Embedder;
use crate::error::{GraphReaderError, Result};
use crate::graph::GraphStore;
use crate::oracle::{DecisionOracle, Stage};

use super::state::{TraversalOutcome, TraversalState, TraversalStatus};
use super::{answer, chunk_read, fact_check, neighbor_select, plan, seed};

/// What a stage asks the engine to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    To(Stage),
    /// Answer reasoning finished.
    Done,
    /// No transition applies to the oracle's action.
    Stall { action: String, reason: String },
}

impl Transition {
    pub(crate) fn stall(state: &mut TraversalState, raw_action: &str, error: GraphReaderError) -> Self {
        state.chosen_action = raw_action.to_string();
        Transition::Stall {
            action: raw_action.to_string(),
            reason: error.to_string(),
        }
    }
}

/// The graph-reading agent: a state machine over six oracle-driven stages.
///
/// ```text
/// Plan -> Seed -> FactCheck <-> ChunkRead <-> NeighborSelect -> Answer
/// ```
///
/// Runs are sequential. One oracle call or store query is in flight at a time
/// and the state has a single owner, so a reader can serve many questions
/// concurrently by calling [`run`](Self::run) from separate tasks.
pub struct GraphReader {
    pub(super) store: Arc<dyn GraphStore>,
    pub(super) embedder: Arc<dyn Embedder>,
    pub(super) oracle: Arc<dyn DecisionOracle>,
    pub(super) config: TraversalConfig,
}

impl GraphReader {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn Embedder>,
        oracle: Arc<dyn DecisionOracle>,
        config: TraversalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            oracle,
            config,
        }
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    /// Answer `question` by exploring the graph.
    ///
    /// Returns `Ok` with [`TraversalStatus::Answered`] or, when the oracle
    /// emits an action with no valid transition, [`TraversalStatus::Stalled`]
    /// together with the state at that point. Oracle, embedding and store
    /// failures are returned as `Err`.
    pub async fn run(&self, question: &str) -> Result<TraversalOutcome> {
        if question.trim().is_empty() {
            return Err(GraphReaderError::InvalidInput("question is empty".to_string()));
        }

        let mut state = TraversalState::new(question);
        let mut stage = Stage::RationalPlan;
        log::info!("Reading graph for question: {}", question);

        loop {
            if stage != Stage::AnswerReasoning && self.budget_exhausted(&state) {
                log::warn!(
                    "Step budget of {} exhausted in {}, forcing answer reasoning",
                    self.config.max_steps,
                    stage
                );
                stage = Stage::AnswerReasoning;
            }

            state.steps += 1;
            log::info!("Step {}: {}", state.steps, stage);

            let transition = match stage {
                Stage::RationalPlan => plan::run(self, &mut state).await?,
                Stage::InitialNodeSelection => seed::run(self, &mut state).await?,
                Stage::AtomicFactCheck => fact_check::run(self, &mut state).await?,
                Stage::ChunkRead => chunk_read::run(self, &mut state).await?,
                Stage::NeighborSelect => neighbor_select::run(self, &mut state).await?,
                Stage::AnswerReasoning => answer::run(self, &mut state).await?,
            };

            match transition {
                Transition::To(next) => {
                    log::debug!("{} -> {} ({})", stage, next, state.chosen_action);
                    stage = next;
                }
                Transition::Done => {
                    return Ok(TraversalOutcome {
                        status: TraversalStatus::Answered,
                        state,
                    });
                }
                Transition::Stall { action, reason } => {
                    log::warn!("Stalled in {} on action {:?}: {}", stage, action, reason);
                    return Ok(TraversalOutcome {
                        status: TraversalStatus::Stalled { stage, action, reason },
                        state,
                    });
                }
            }
        }
    }

    fn budget_exhausted(&self, state: &TraversalState) -> bool {
        self.config.max_steps > 0 && state.steps >= self.config.max_steps
    }
}

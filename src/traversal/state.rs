use serde::Serialize;
use std::collections::HashSet;

use crate::oracle::Stage;

/// Working memory of one traversal. Owned by the engine for a single question.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraversalState {
    pub question: String,
    pub rational_plan: String,
    /// Oracle-authored findings, replaced wholesale by each fact/chunk stage.
    pub notebook: String,
    pub previous_actions: Vec<String>,
    pub check_atomic_facts_queue: Vec<String>,
    /// Read as a stack: the last pushed chunk is read first.
    pub check_chunks_queue: Vec<String>,
    pub neighbor_check_queue: Vec<String>,
    pub chosen_action: String,
    pub answer: String,
    pub analysis: String,
    /// Key elements whose facts have been checked this run.
    pub visited_key_elements: HashSet<String>,
    /// Chunks read this run.
    pub visited_chunks: HashSet<String>,
    /// Stage executions so far.
    pub steps: usize,
}

impl TraversalState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, action: impl Into<String>) {
        self.previous_actions.push(action.into());
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraversalStatus {
    /// Answer reasoning ran and produced `answer`.
    Answered,
    /// The oracle's action could not be turned into a transition.
    Stalled {
        stage: Stage,
        action: String,
        reason: String,
    },
}

/// Result of [`GraphReader::run`](super::GraphReader::run): the status plus
/// the final state for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct TraversalOutcome {
    pub status: TraversalStatus,
    pub state: TraversalState,
}

impl TraversalOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self.status, TraversalStatus::Answered)
    }

    pub fn answer(&self) -> Option<&str> {
        self.is_answered().then_some(self.state.answer.as_str())
    }
}

//! Graph reader traversal: action parsing, working state, the six decision
//! stages and the engine that wires them together.

pub mod action;
mod answer;
mod chunk_read;
mod engine;
mod fact_check;
mod neighbor_select;
mod plan;
mod seed;
pub mod state;

pub use action::{parse_action, ChunkReadAction, FactCheckAction, NeighborAction, ParsedAction};
pub use engine::GraphReader;
pub use state::{TraversalOutcome, TraversalState, TraversalStatus};

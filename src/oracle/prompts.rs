//! System prompts per stage and a small builder for the user-side context.

use std::fmt::Write;

use super::Stage;

const GRAPH_INTRODUCTION: &str = "You answer questions using information from a text. \
The text has been turned into a graph made of:\n\
1. Text chunks: consecutive pieces of the original text.\n\
2. Atomic facts: the smallest self-contained statements extracted from a chunk.\n\
3. Nodes: key elements of the text, each linked to atomic facts from possibly many chunks.";

const RATIONAL_PLAN: &str = "Your goal is to answer the question by collecting supporting facts from an article. \
Start by writing a rational plan: the ordered steps needed to resolve the question and the key information \
each step requires.\n\n\
Example\n\
Question: Who had a longer tennis career, Danny or Alice?\n\
Plan: To answer this we first need the length of Danny's and Alice's tennis careers, for instance when each \
started and retired, and then we compare the two.";

const INITIAL_NODE_SELECTION: &str = "Task: pick the nodes the search should start from. You receive the \
question, the rational plan and a list of candidate nodes.\n\n\
Requirements:\n\
1. Score each selected node from 0 to 100 for how likely it leads to the answer.\n\
2. Select at least {min_candidates} distinct nodes from the list.\n\
3. Copy each key_element exactly as written in the list. Never invent or reword a node.";

const ATOMIC_FACT_CHECK: &str = "Task: review the atomic facts attached to the current nodes and decide \
whether to read the chunks they come from.\n\n\
Requirements:\n\
1. Rewrite the notebook so it includes every new finding from these facts.\n\
2. Reason about the next action using all available context.\n\
3. Look at the previous actions and avoid revisiting nodes or chunks.\n\
4. Several chunks may be requested at once.\n\
5. Read a chunk whenever one of its facts is even slightly related to the question, \
since facts only capture part of a chunk.\n\
6. Choose stop_and_read_neighbor() only when you are sure the chunks are irrelevant.";

const CHUNK_READ: &str = "Task: read the given text chunk and decide whether the information gathered so far \
is enough to answer the question.\n\n\
Requirements:\n\
1. Rewrite the notebook so it includes every new finding from this chunk.\n\
2. Look at the previous actions and avoid revisiting nodes or chunks.\n\
3. Choose exactly one action.";

const NEIGHBOR_SELECT: &str = "Task: look at the neighboring nodes of the current node and decide whether \
one of them is worth exploring.\n\n\
Requirements:\n\
1. Look at the previous actions and avoid revisiting nodes or chunks.\n\
2. Choose exactly one action: read a single neighbor or terminate.";

const ANSWER_REASONING: &str = "Task: the graph has been explored along several paths and the findings of \
each path were written to a notebook. Analyze the notebook and answer the question.\n\n\
Requirements:\n\
1. Analyze the whole notebook before answering.\n\
2. Combine complementary notes and resolve contradictions by majority vote across paths.\n\
3. Base the final answer on all available information.\n\n\
Example\n\
Question: Who had a longer tennis career, Danny or Alice?\n\
Notebook: 1. Danny played from 1972 to 1990; Alice's career length is unknown. 2. Alice played for 15 years.\n\
analyze: Path 1 gives Danny 1990 - 1972 = 18 years. Path 2 gives Alice 15 years. 18 is more than 15.\n\
final_answer: Danny's tennis career was longer than Alice's.";

/// Minimum candidate count written into the seed prompt.
pub const DEFAULT_MIN_SEED_CANDIDATES: usize = 10;

/// System prompt for `stage`, with the default seed candidate minimum.
pub fn system_prompt(stage: Stage) -> String {
    system_prompt_with(stage, DEFAULT_MIN_SEED_CANDIDATES)
}

pub fn system_prompt_with(stage: Stage, min_seed_candidates: usize) -> String {
    let task = match stage {
        // Planning happens before the graph is involved.
        Stage::RationalPlan => return format!("{}\n\nFollow the format of the example.", RATIONAL_PLAN),
        Stage::InitialNodeSelection => {
            INITIAL_NODE_SELECTION.replace("{min_candidates}", &min_seed_candidates.to_string())
        }
        Stage::AtomicFactCheck => ATOMIC_FACT_CHECK.to_string(),
        Stage::ChunkRead => CHUNK_READ.to_string(),
        Stage::NeighborSelect => NEIGHBOR_SELECT.to_string(),
        Stage::AnswerReasoning => ANSWER_REASONING.to_string(),
    };
    format!("{}\n\n{}\n\nRespond strictly in the requested format.", GRAPH_INTRODUCTION, task)
}

/// Labelled sections of the user message, rendered in insertion order.
#[derive(Debug, Default)]
pub struct PromptContext {
    out: String,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, label: &str, value: &str) -> Self {
        let value = if value.trim().is_empty() { "(none)" } else { value };
        let _ = writeln!(self.out, "{}: {}", label, value);
        self
    }

    /// One `- item` line per entry, or `(none)`.
    pub fn list<I, S>(mut self, label: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut body = String::new();
        for item in items {
            let _ = writeln!(body, "- {}", item.as_ref());
        }
        if body.is_empty() {
            let _ = writeln!(self.out, "{}: (none)", label);
        } else {
            let _ = write!(self.out, "{}:\n{}", label, body);
        }
        self
    }

    pub fn build(self) -> String {
        self.out.trim_end().to_string()
    }
}

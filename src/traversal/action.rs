//! Action strings emitted by the oracle, e.g. `read_chunk([c1, c2])`.
//!
//! [`parse_action`] scrapes a `name(args)` call out of free text and each
//! stage converts the result into its own closed action enum, so an action
//! outside a stage's vocabulary fails in one place.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::error::{GraphReaderError, Result};

/// An action name with its ordered literal arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    pub name: String,
    pub arguments: Vec<String>,
}

impl fmt::Display for ParsedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arguments.join(", "))
    }
}

/// Every action name a stage accepts.
const ACTION_NAMES: &[&str] = &[
    "read_chunk",
    "stop_and_read_neighbor",
    "search_more",
    "read_previous_chunk",
    "read_subsequent_chunk",
    "read_neighbor_node",
    "termination",
];

fn call_regex() -> &'static Regex {
    static CALL: OnceLock<Regex> = OnceLock::new();
    CALL.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("valid call pattern"))
}

fn bare_name_regex() -> &'static Regex {
    static BARE: OnceLock<Regex> = OnceLock::new();
    BARE.get_or_init(|| Regex::new(r"^[`\s]*([A-Za-z_][A-Za-z0-9_]*)[`\s]*$").expect("valid name pattern"))
}

/// Parse an action string into its name and arguments.
///
/// Tolerates surrounding prose, whitespace, missing square brackets, a
/// missing closing parenthesis and a bare name without parentheses. When the
/// text holds several calls, the first one naming a known action wins, and
/// otherwise the last one. Quoted arguments may contain commas and
/// parentheses; an apostrophe inside an unquoted argument is kept. Fails
/// with `MalformedAction` when no call can be found.
pub fn parse_action(raw: &str) -> Result<ParsedAction> {
    let calls: Vec<_> = call_regex().captures_iter(raw).collect();
    let chosen = calls
        .iter()
        .find(|caps| ACTION_NAMES.contains(&caps[1].to_lowercase().as_str()))
        .or_else(|| calls.last());

    if let Some(caps) = chosen {
        let open = caps.get(0).map_or(raw.len(), |m| m.end());
        return Ok(ParsedAction {
            name: caps[1].to_lowercase(),
            arguments: split_arguments(argument_text(&raw[open..])),
        });
    }

    if let Some(caps) = bare_name_regex().captures(raw) {
        return Ok(ParsedAction {
            name: caps[1].to_lowercase(),
            arguments: Vec::new(),
        });
    }

    Err(GraphReaderError::MalformedAction(format!(
        "no name(arguments) call in {:?}",
        raw
    )))
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

/// Text between an opening parenthesis and its matching close, or the rest
/// of the input when the call is truncated.
fn argument_text(rest: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut token_start = true;

    for (i, c) in rest.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            c if is_quote(c) && token_start => quote = Some(c),
            '(' => depth += 1,
            ')' if depth == 0 => return &rest[..i],
            ')' => depth -= 1,
            _ => {}
        }
        if !c.is_whitespace() {
            token_start = matches!(c, '(' | '[' | ',');
        }
    }
    rest
}

/// Split on top-level commas. Square brackets are dropped and a quote only
/// opens a string at the start of an argument.
fn split_arguments(text: &str) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for c in text.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            c if is_quote(c) && current.trim().is_empty() => {
                current.clear();
                quote = Some(c);
            }
            ',' if depth == 0 => push_argument(&mut arguments, &mut current),
            '[' | ']' if depth == 0 => {}
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            _ => current.push(c),
        }
    }
    push_argument(&mut arguments, &mut current);
    arguments
}

fn push_argument(arguments: &mut Vec<String>, current: &mut String) {
    let token = current.trim();
    if !token.is_empty() {
        arguments.push(token.to_string());
    }
    current.clear();
}

fn unsupported(stage: &str, action: &ParsedAction) -> GraphReaderError {
    GraphReaderError::MalformedAction(format!("{} is not a {} action", action, stage))
}

/// Actions available after reviewing atomic facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactCheckAction {
    ReadChunk(Vec<String>),
    StopAndReadNeighbor,
}

impl TryFrom<ParsedAction> for FactCheckAction {
    type Error = GraphReaderError;

    fn try_from(action: ParsedAction) -> Result<Self> {
        match action.name.as_str() {
            "read_chunk" => Ok(FactCheckAction::ReadChunk(action.arguments)),
            "stop_and_read_neighbor" => Ok(FactCheckAction::StopAndReadNeighbor),
            _ => Err(unsupported("fact check", &action)),
        }
    }
}

/// Actions available after reading a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkReadAction {
    SearchMore,
    ReadPreviousChunk,
    ReadSubsequentChunk,
    Termination,
}

impl TryFrom<ParsedAction> for ChunkReadAction {
    type Error = GraphReaderError;

    fn try_from(action: ParsedAction) -> Result<Self> {
        match action.name.as_str() {
            "search_more" => Ok(ChunkReadAction::SearchMore),
            "read_previous_chunk" => Ok(ChunkReadAction::ReadPreviousChunk),
            "read_subsequent_chunk" => Ok(ChunkReadAction::ReadSubsequentChunk),
            "termination" => Ok(ChunkReadAction::Termination),
            _ => Err(unsupported("chunk read", &action)),
        }
    }
}

/// Actions available when choosing among neighbors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborAction {
    ReadNeighborNode(String),
    Termination,
}

impl TryFrom<ParsedAction> for NeighborAction {
    type Error = GraphReaderError;

    fn try_from(action: ParsedAction) -> Result<Self> {
        match action.name.as_str() {
            // One key element; an unquoted name with commas arrives in pieces.
            "read_neighbor_node" if !action.arguments.is_empty() => {
                Ok(NeighborAction::ReadNeighborNode(action.arguments.join(", ")))
            }
            "read_neighbor_node" => Err(GraphReaderError::MalformedAction(
                "read_neighbor_node needs a key element".to_string(),
            )),
            "termination" => Ok(NeighborAction::Termination),
            _ => Err(unsupported("neighbor select", &action)),
        }
    }
}

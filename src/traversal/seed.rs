use std::cmp::Reverse;
use std::collections::HashSet;

use crate::error::Result;
use crate::graph::normalize_key_element;
use crate::oracle::prompts::{system_prompt_with, PromptContext};
use crate::oracle::{decide_with, ScoredNode, SeedDecision, Stage};

use super::engine::{GraphReader, Transition};
use super::state::TraversalState;

/// Pick the starting key elements.
///
/// The question is embedded and the most similar key elements are offered to
/// the oracle for scoring. Picks that do not normalize to an offered id are
/// dropped; the rest are ordered by score (stable, so ties keep oracle
/// order), deduplicated and cut to `initial_nodes`.
pub(super) async fn run(reader: &GraphReader, state: &mut TraversalState) -> Result<Transition> {
    let config = &reader.config;
    let embedding = reader.embedder.embed(&state.question).await?;
    let candidates = reader
        .store
        .get_similar_nodes(&embedding, config.similar_nodes_k)
        .await?;
    if candidates.is_empty() {
        log::warn!("Similarity search returned no key elements; is the graph embedded?");
    }
    log::debug!(
        "Seed candidates: {:?}",
        candidates.iter().map(|c| (c.id.as_str(), c.similarity)).collect::<Vec<_>>()
    );

    let prompt = PromptContext::new()
        .field("Question", &state.question)
        .field("Plan", &state.rational_plan)
        .list("Nodes", candidates.iter().map(|c| c.id.as_str()))
        .build();
    let system_prompt = system_prompt_with(Stage::InitialNodeSelection, config.min_seed_candidates);
    let decision: SeedDecision = decide_with(reader.oracle.as_ref(), system_prompt, prompt).await?;

    if decision.initial_nodes.len() < config.min_seed_candidates {
        log::warn!(
            "Oracle scored {} nodes, asked for at least {}",
            decision.initial_nodes.len(),
            config.min_seed_candidates
        );
    }

    let offered: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let seeds = select_seeds(decision.initial_nodes, &offered, config.initial_nodes);

    log::info!("Initial nodes: {:?}", seeds);
    state.check_atomic_facts_queue = seeds;
    state.record("initial_node_selection");
    Ok(Transition::To(Stage::AtomicFactCheck))
}

fn select_seeds(scored: Vec<ScoredNode>, offered: &HashSet<&str>, limit: usize) -> Vec<String> {
    let mut kept: Vec<(String, i64)> = Vec::with_capacity(scored.len());
    for node in scored {
        let id = normalize_key_element(&node.key_element);
        if offered.contains(id.as_str()) {
            kept.push((id, node.score));
        } else {
            log::warn!("Dropping seed {:?}: not among the offered nodes", node.key_element);
        }
    }
    kept.sort_by_key(|(_, score)| Reverse(*score));

    let mut seen = HashSet::new();
    kept.into_iter()
        .filter(|(id, _)| seen.insert(id.clone()))
        .map(|(id, _)| id)
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(pairs: &[(&str, i64)]) -> Vec<ScoredNode> {
        pairs
            .iter()
            .map(|(key_element, score)| ScoredNode {
                key_element: key_element.to_string(),
                score: *score,
            })
            .collect()
    }

    #[test]
    fn test_top_scores_in_descending_order() {
        let offered: HashSet<&str> = ["a", "b", "c", "d"].into_iter().collect();
        let seeds = select_seeds(scored(&[("a", 10), ("b", 90), ("c", 50), ("d", 70)]), &offered, 3);
        assert_eq!(seeds, vec!["b", "d", "c"]);
    }

    #[test]
    fn test_ties_keep_oracle_order_and_duplicates_collapse() {
        let offered: HashSet<&str> = ["a", "b", "harry potter"].into_iter().collect();
        let seeds = select_seeds(
            scored(&[("b", 80), ("Harry  Potter", 80), ("a", 80), ("harry potter", 95)]),
            &offered,
            5,
        );
        assert_eq!(seeds, vec!["harry potter", "b", "a"]);
    }

    #[test]
    fn test_unoffered_picks_are_dropped() {
        let offered: HashSet<&str> = ["alice"].into_iter().collect();
        let seeds = select_seeds(scored(&[("Mallory", 100), (" ALICE ", 20)]), &offered, 5);
        assert_eq!(seeds, vec!["alice"]);
    }
}

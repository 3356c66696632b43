//! Typed graph model: documents, chunks, atomic facts and key elements.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::error::GraphReaderError;

/// Normalize key element text into its node id.
///
/// Trims, collapses every whitespace run to a single space and lowercases, so
/// `"  Harry   Potter "` and `"harry potter"` address the same node.
pub fn normalize_key_element(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 hex digest of kind-tagged content.
///
/// The kind is part of the digest so a single-chunk document and its chunk
/// get distinct ids.
pub fn content_id(kind: NodeKind, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Discriminator stored alongside each node row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Chunk,
    AtomicFact,
    KeyElement,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Document => "document",
            NodeKind::Chunk => "chunk",
            NodeKind::AtomicFact => "atomic_fact",
            NodeKind::KeyElement => "key_element",
        }
    }
}

impl FromStr for NodeKind {
    type Err = GraphReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(NodeKind::Document),
            "chunk" => Ok(NodeKind::Chunk),
            "atomic_fact" => Ok(NodeKind::AtomicFact),
            "key_element" => Ok(NodeKind::KeyElement),
            other => Err(GraphReaderError::InvalidInput(format!("Unknown node kind: {}", other))),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Full source text and its provenance.
    Document {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Contiguous slice of a document; `index` is its position in the chain.
    Chunk {
        id: String,
        content: String,
        index: i64,
    },
    /// Minimal textual claim extracted from one chunk.
    AtomicFact { id: String, content: String },
    /// Normalized noun phrase linking facts across chunks.
    KeyElement {
        id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        embedding: Option<Vec<f32>>,
    },
}

impl Node {
    pub fn document(content: impl Into<String>, source: Option<String>) -> Self {
        let content = content.into();
        Node::Document {
            id: content_id(NodeKind::Document, &content),
            content,
            source,
        }
    }

    pub fn chunk(content: impl Into<String>, index: i64) -> Self {
        let content = content.into();
        Node::Chunk {
            id: content_id(NodeKind::Chunk, &content),
            content,
            index,
        }
    }

    pub fn atomic_fact(content: impl Into<String>) -> Self {
        let content = content.into();
        Node::AtomicFact {
            id: content_id(NodeKind::AtomicFact, &content),
            content,
        }
    }

    pub fn key_element(text: impl Into<String>) -> Self {
        let content = text.into();
        Node::KeyElement {
            id: normalize_key_element(&content),
            content,
            embedding: None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Node::Document { id, .. }
            | Node::Chunk { id, .. }
            | Node::AtomicFact { id, .. }
            | Node::KeyElement { id, .. } => id,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Node::Document { content, .. }
            | Node::Chunk { content, .. }
            | Node::AtomicFact { content, .. }
            | Node::KeyElement { content, .. } => content,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Document { .. } => NodeKind::Document,
            Node::Chunk { .. } => NodeKind::Chunk,
            Node::AtomicFact { .. } => NodeKind::AtomicFact,
            Node::KeyElement { .. } => NodeKind::KeyElement,
        }
    }

    /// Rewrite a key element's id to the normalized form of its text.
    /// Other kinds are returned unchanged.
    fn canonicalized(self) -> Self {
        match self {
            Node::KeyElement { id, content, embedding } => {
                let normalized = match normalize_key_element(&content) {
                    from_content if from_content.is_empty() => normalize_key_element(&id),
                    from_content => from_content,
                };
                Node::KeyElement {
                    id: normalized,
                    content,
                    embedding,
                }
            }
            other => other,
        }
    }

    /// Fill fields this node lacks from another node with the same id.
    /// Existing values win, so an embedding is set at most once.
    fn merge_missing(&mut self, other: Node) {
        match (self, other) {
            (Node::Document { source, .. }, Node::Document { source: other_source, .. }) => {
                if source.is_none() {
                    *source = other_source;
                }
            }
            (Node::KeyElement { embedding, .. }, Node::KeyElement { embedding: other_embedding, .. }) => {
                if embedding.is_none() {
                    *embedding = other_embedding;
                }
            }
            _ => {}
        }
    }
}

/// Typed relationship between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relationship {
    /// document -> chunk
    HasChunk,
    /// chunk -> following chunk of the same document
    Next,
    /// chunk -> atomic fact
    HasAtomicFact,
    /// atomic fact -> key element
    HasKeyElement,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::HasChunk => "HAS_CHUNK",
            Relationship::Next => "NEXT",
            Relationship::HasAtomicFact => "HAS_ATOMIC_FACT",
            Relationship::HasKeyElement => "HAS_KEY_ELEMENT",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed typed edge. Equality is by value over all three fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub relationship: Relationship,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(relationship: Relationship, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            relationship,
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Serialized form of a [`Graph`]: plain node and edge lists.
#[derive(Serialize, Deserialize)]
pub struct GraphFile {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// A set of nodes (unique by id) and a set of edges (unique by value).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "GraphFile", into = "GraphFile")]
pub struct Graph {
    nodes: HashMap<String, Node>,
    edges: HashSet<Edge>,
}

impl From<GraphFile> for Graph {
    fn from(file: GraphFile) -> Self {
        let mut graph = Graph::new();
        // Key elements whose stored id was not the normalized text
        let mut renamed: HashMap<String, String> = HashMap::new();
        for node in file.nodes {
            let raw_id = node.id().to_string();
            let node = node.canonicalized();
            if node.id() != raw_id {
                renamed.insert(raw_id, node.id().to_string());
            }
            graph.add_node(node);
        }
        for mut edge in file.edges {
            if let Some(id) = renamed.get(&edge.source) {
                edge.source = id.clone();
            }
            if let Some(id) = renamed.get(&edge.target) {
                edge.target = id.clone();
            }
            graph.add_edge(edge);
        }
        graph
    }
}

impl From<Graph> for GraphFile {
    fn from(graph: Graph) -> Self {
        let mut nodes: Vec<Node> = graph.nodes.into_values().collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        let mut edges: Vec<Edge> = graph.edges.into_iter().collect();
        edges.sort();
        GraphFile { nodes, edges }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, merging into an existing node with the same id.
    /// A key element is stored under the normalized form of its text.
    /// Returns true if the id was new.
    pub fn add_node(&mut self, node: Node) -> bool {
        let node = node.canonicalized();
        match self.nodes.get_mut(node.id()) {
            Some(existing) => {
                existing.merge_missing(node);
                false
            }
            None => {
                self.nodes.insert(node.id().to_string(), node);
                true
            }
        }
    }

    /// Insert an edge. Returns false if an equal edge was already present.
    /// A `HAS_KEY_ELEMENT` target is normalized like the key element ids.
    pub fn add_edge(&mut self, mut edge: Edge) -> bool {
        if edge.relationship == Relationship::HasKeyElement {
            edge.target = normalize_key_element(&edge.target);
        }
        self.edges.insert(edge)
    }

    /// Add a document node and return its id.
    pub fn add_document(&mut self, content: &str, source: Option<&str>) -> String {
        let node = Node::document(content, source.map(str::to_string));
        let id = node.id().to_string();
        self.add_node(node);
        id
    }

    /// Add a chunk of `document_id`, linking it after `previous` in the chain.
    pub fn add_chunk(
        &mut self,
        document_id: &str,
        previous: Option<&str>,
        content: &str,
        index: i64,
    ) -> String {
        let node = Node::chunk(content, index);
        let id = node.id().to_string();
        self.add_node(node);
        self.add_edge(Edge::new(Relationship::HasChunk, document_id, id.as_str()));
        if let Some(previous) = previous {
            self.add_edge(Edge::new(Relationship::Next, previous, id.as_str()));
        }
        id
    }

    /// Add an atomic fact of `chunk_id` together with its key elements.
    pub fn add_atomic_fact(&mut self, chunk_id: &str, content: &str, key_elements: &[&str]) -> String {
        let node = Node::atomic_fact(content);
        let fact_id = node.id().to_string();
        self.add_node(node);
        self.add_edge(Edge::new(Relationship::HasAtomicFact, chunk_id, fact_id.as_str()));
        for element in key_elements {
            let key_element = Node::key_element(*element);
            let key_id = key_element.id().to_string();
            self.add_node(key_element);
            self.add_edge(Edge::new(Relationship::HasKeyElement, fact_id.as_str(), key_id));
        }
        fact_id
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_element_idempotent() {
        assert_eq!(normalize_key_element("  Harry   Potter "), "harry potter");
        assert_eq!(
            normalize_key_element("  Harry   Potter "),
            normalize_key_element("harry potter")
        );
        assert_eq!(normalize_key_element("Harry\tPotter\n"), "harry potter");
        let once = normalize_key_element("The  Boy Who LIVED");
        assert_eq!(normalize_key_element(&once), once);
    }

    #[test]
    fn test_key_element_id_is_normalized_text() {
        let node = Node::key_element("  Harry   Potter ");
        assert_eq!(node.id(), "harry potter");
        assert_eq!(node.content(), "  Harry   Potter ");
        assert_eq!(node.kind(), NodeKind::KeyElement);
    }

    #[test]
    fn test_content_id_depends_on_kind() {
        let document = Node::document("Short text.", None);
        let chunk = Node::chunk("Short text.", 0);
        assert_ne!(document.id(), chunk.id());
        assert_eq!(chunk.id(), Node::chunk("Short text.", 3).id());
        assert_eq!(chunk.id().len(), 64);
    }

    #[test]
    fn test_duplicate_edge_is_ignored() {
        let mut graph = Graph::new();
        assert!(graph.add_edge(Edge::new(Relationship::Next, "a", "b")));
        assert!(!graph.add_edge(Edge::new(Relationship::Next, "a", "b")));
        assert_eq!(graph.edge_count(), 1);

        // Different relationship or direction is a different edge
        assert!(graph.add_edge(Edge::new(Relationship::HasChunk, "a", "b")));
        assert!(graph.add_edge(Edge::new(Relationship::Next, "b", "a")));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_duplicate_node_is_merged() {
        let mut graph = Graph::new();
        assert!(graph.add_node(Node::key_element("Hogwarts")));
        assert!(!graph.add_node(Node::KeyElement {
            id: "hogwarts".to_string(),
            content: "HOGWARTS".to_string(),
            embedding: Some(vec![1.0, 0.0]),
        }));
        assert!(!graph.add_node(Node::KeyElement {
            id: "hogwarts".to_string(),
            content: "hogwarts".to_string(),
            embedding: Some(vec![0.0, 1.0]),
        }));
        assert_eq!(graph.node_count(), 1);

        match graph.node("hogwarts").unwrap() {
            Node::KeyElement { content, embedding, .. } => {
                assert_eq!(content, "Hogwarts");
                assert_eq!(embedding.as_deref(), Some(&[1.0, 0.0][..]));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_builders_link_chain_and_facts() {
        let mut graph = Graph::new();
        let doc = graph.add_document("Alice met Bob. Bob owns a shop.", Some("wikipedia"));
        let c0 = graph.add_chunk(&doc, None, "Alice met Bob.", 0);
        let c1 = graph.add_chunk(&doc, Some(c0.as_str()), "Bob owns a shop.", 1);
        let fact = graph.add_atomic_fact(&c1, "Bob owns a shop.", &["Bob", "shop"]);
        graph.add_atomic_fact(&c0, "Alice met Bob.", &["alice", " bob "]);

        assert!(graph.edges().any(|e| *e == Edge::new(Relationship::Next, c0.as_str(), c1.as_str())));
        assert!(graph.edges().any(|e| *e == Edge::new(Relationship::HasAtomicFact, c1.as_str(), fact.as_str())));
        assert!(graph.edges().any(|e| *e == Edge::new(Relationship::HasKeyElement, fact.as_str(), "bob")));
        // doc, 2 chunks, 2 facts, bob/shop/alice
        assert_eq!(graph.node_count(), 8);
        // 2 HAS_CHUNK, 1 NEXT, 2 HAS_ATOMIC_FACT, 4 HAS_KEY_ELEMENT
        assert_eq!(graph.edge_count(), 9);
    }

    #[test]
    fn test_graph_json_shape() {
        let mut graph = Graph::new();
        let doc = graph.add_document("Text", None);
        graph.add_chunk(&doc, None, "Text", 0);

        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["edges"][0]["relationship"], "HAS_CHUNK");
        assert!(json["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .any(|n| n["type"] == "chunk" && n["index"] == 0));

        let parsed: Graph = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, graph);
    }

    #[test]
    fn test_graph_file_with_duplicate_edges_deduplicates() {
        let json = r#"{
            "nodes": [{"type": "key_element", "id": "x", "content": "X"}],
            "edges": [
                {"relationship": "NEXT", "source": "a", "target": "b"},
                {"relationship": "NEXT", "source": "a", "target": "b"}
            ]
        }"#;
        let graph: Graph = serde_json::from_str(json).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_graph_file_key_element_ids_are_normalized() {
        let json = r#"{
            "nodes": [
                {"type": "atomic_fact", "id": "f1", "content": "Harry Potter lives at Privet Drive."},
                {"type": "key_element", "id": "Harry  Potter", "content": "Harry  Potter"},
                {"type": "key_element", "id": "ke-2", "content": " Privet Drive "}
            ],
            "edges": [
                {"relationship": "HAS_KEY_ELEMENT", "source": "f1", "target": "Harry  Potter"},
                {"relationship": "HAS_KEY_ELEMENT", "source": "f1", "target": "ke-2"}
            ]
        }"#;
        let graph: Graph = serde_json::from_str(json).unwrap();

        assert!(graph.node(&normalize_key_element("Harry  Potter")).is_some());
        assert!(graph.node("Harry  Potter").is_none());
        assert!(graph.node("privet drive").is_some());
        assert!(graph.node("ke-2").is_none());
        assert!(graph.edges().any(|e| *e == Edge::new(Relationship::HasKeyElement, "f1", "harry potter")));
        assert!(graph.edges().any(|e| *e == Edge::new(Relationship::HasKeyElement, "f1", "privet drive")));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_add_node_normalizes_key_element_id() {
        let mut graph = Graph::new();
        graph.add_node(Node::KeyElement {
            id: "Hogwarts School".to_string(),
            content: "Hogwarts  School".to_string(),
            embedding: None,
        });
        assert!(graph.node("hogwarts school").is_some());
        assert!(graph.add_edge(Edge::new(Relationship::HasKeyElement, "f", " Hogwarts School")));
        assert!(!graph.add_edge(Edge::new(Relationship::HasKeyElement, "f", "hogwarts school")));
    }

    #[test]
    fn test_node_kind_from_str() {
        assert_eq!("atomic_fact".parse::<NodeKind>().unwrap(), NodeKind::AtomicFact);
        assert!("entity".parse::<NodeKind>().is_err());
    }
}

//! Knowledge graph module: typed node/edge model, SQLite import and the
//! read-side queries the traversal runs against.
//!
//! The graph is a four-level hierarchy: documents own chunks (linked in
//! order by `NEXT`), chunks own atomic facts, and atomic facts point at the
//! key elements they mention. Key elements are shared across facts, which is
//! what lets the reader hop between chunks.

mod import;
mod model;
mod store;

pub use import::{graph_stats, import_graph, reset_graph, GraphStats, ImportSummary};
pub use model::{content_id, normalize_key_element, Edge, Graph, GraphFile, Node, NodeKind, Relationship};
pub use store::{Adjacent, AtomicFact, ChunkContent, GraphStore, SqliteGraphStore};

pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod oracle;
pub mod search;
pub mod traversal;

pub use config::Config;
pub use error::{GraphReaderError, Result};
pub use graph::{Graph, GraphStore, Node, SqliteGraphStore};
pub use traversal::{GraphReader, TraversalOutcome, TraversalStatus};

//! Read-side graph queries used by the traversal.

use futures_util::future::BoxFuture;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::Db;
use crate::error::{GraphReaderError, Result};
use crate::search::{parse_embedding, top_k_similar, SimilarNode};

use super::model::{Node, NodeKind};

/// An atomic fact paired with the chunk it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicFact {
    pub chunk_id: String,
    pub text: String,
}

/// Chunk text addressed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkContent {
    pub chunk_id: String,
    pub text: String,
}

/// Result of following the `NEXT` chain from a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjacent {
    /// The neighboring chunk in the requested direction.
    Chunk(String),
    /// The chunk exists but sits at that end of its chain.
    Boundary,
    /// The chunk itself is not in the store.
    Missing,
}

/// Query capabilities the traversal needs from a graph store.
pub trait GraphStore: Send + Sync {
    /// Facts connected to any of the key elements, deduplicated.
    fn get_atomic_facts<'a>(&'a self, key_element_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<AtomicFact>>>;

    /// Key elements sharing an atomic fact with the inputs, ranked by the
    /// number of shared facts (descending), inputs excluded.
    fn get_neighbors_by_key_element<'a>(
        &'a self,
        key_element_ids: &'a [String],
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<String>>>;

    fn get_subsequent_chunk_id<'a>(&'a self, chunk_id: &'a str) -> BoxFuture<'a, Result<Adjacent>>;

    fn get_previous_chunk_id<'a>(&'a self, chunk_id: &'a str) -> BoxFuture<'a, Result<Adjacent>>;

    fn get_chunk<'a>(&'a self, chunk_id: &'a str) -> BoxFuture<'a, Result<Option<ChunkContent>>>;

    fn get_node_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Node>>>;

    /// Key elements with embeddings, ordered by cosine similarity descending.
    fn get_similar_nodes<'a>(&'a self, embedding: &'a [f32], k: usize) -> BoxFuture<'a, Result<Vec<SimilarNode>>>;
}

/// [`GraphStore`] backed by the SQLite `nodes`/`edges` tables.
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    db: Db,
}

impl SqliteGraphStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    async fn adjacent_chunk(&self, chunk_id: &str, direction: ChainDirection) -> Result<Adjacent> {
        let chunk_id = chunk_id.to_string();
        self.db
            .with_connection(move |conn| {
                let exists: bool = conn
                    .prepare("SELECT 1 FROM nodes WHERE id = ?1 AND kind = 'chunk'")?
                    .exists(params![chunk_id])?;
                if !exists {
                    return Ok(Adjacent::Missing);
                }

                let sql = match direction {
                    ChainDirection::Subsequent => {
                        "SELECT target_id FROM edges WHERE relationship = 'NEXT' AND source_id = ?1 LIMIT 1"
                    }
                    ChainDirection::Previous => {
                        "SELECT source_id FROM edges WHERE relationship = 'NEXT' AND target_id = ?1 LIMIT 1"
                    }
                };
                let adjacent: Option<String> = conn
                    .query_row(sql, params![chunk_id], |row| row.get(0))
                    .optional()?;

                Ok(match adjacent {
                    Some(id) => Adjacent::Chunk(id),
                    None => Adjacent::Boundary,
                })
            })
            .await
    }
}

#[derive(Debug, Clone, Copy)]
enum ChainDirection {
    Previous,
    Subsequent,
}

fn placeholders(count: usize, offset: usize) -> String {
    (1..=count)
        .map(|i| format!("?{}", i + offset))
        .collect::<Vec<_>>()
        .join(",")
}

impl GraphStore for SqliteGraphStore {
    fn get_atomic_facts<'a>(&'a self, key_element_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<AtomicFact>>> {
        Box::pin(async move {
            if key_element_ids.is_empty() {
                return Ok(Vec::new());
            }
            let ids = key_element_ids.to_vec();
            let facts = self
                .db
                .with_connection(move |conn| {
                    let sql = format!(
                        r#"
                        SELECT DISTINCT has_fact.source_id, fact.content
                        FROM edges has_key
                        JOIN nodes fact ON fact.id = has_key.source_id AND fact.kind = 'atomic_fact'
                        JOIN edges has_fact ON has_fact.target_id = fact.id
                            AND has_fact.relationship = 'HAS_ATOMIC_FACT'
                        WHERE has_key.relationship = 'HAS_KEY_ELEMENT'
                          AND has_key.target_id IN ({})
                        ORDER BY has_fact.source_id, fact.content
                        "#,
                        placeholders(ids.len(), 0)
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
                        Ok(AtomicFact {
                            chunk_id: row.get(0)?,
                            text: row.get(1)?,
                        })
                    })?;
                    let mut out = Vec::new();
                    for row in rows {
                        out.push(row?);
                    }
                    Ok::<Vec<AtomicFact>, GraphReaderError>(out)
                })
                .await?;
            log::debug!("Fetched {} atomic facts for {} key elements", facts.len(), key_element_ids.len());
            Ok(facts)
        })
    }

    fn get_neighbors_by_key_element<'a>(
        &'a self,
        key_element_ids: &'a [String],
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            if key_element_ids.is_empty() || limit == 0 {
                return Ok(Vec::new());
            }
            let ids = key_element_ids.to_vec();
            self.db
                .with_connection(move |conn| {
                    let n = ids.len();
                    let sql = format!(
                        r#"
                        SELECT neighbor.target_id, COUNT(*) AS shared
                        FROM edges origin
                        JOIN edges neighbor ON neighbor.source_id = origin.source_id
                            AND neighbor.relationship = 'HAS_KEY_ELEMENT'
                        WHERE origin.relationship = 'HAS_KEY_ELEMENT'
                          AND origin.target_id IN ({})
                          AND neighbor.target_id NOT IN ({})
                        GROUP BY neighbor.target_id
                        ORDER BY shared DESC, neighbor.target_id ASC
                        LIMIT ?{}
                        "#,
                        placeholders(n, 0),
                        placeholders(n, n),
                        2 * n + 1
                    );
                    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(2 * n + 1);
                    for id in ids.iter().chain(ids.iter()) {
                        params.push(Box::new(id.clone()));
                    }
                    params.push(Box::new(limit as i64));

                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?;
                    let mut out = Vec::new();
                    for row in rows {
                        out.push(row?);
                    }
                    Ok::<Vec<String>, GraphReaderError>(out)
                })
                .await
        })
    }

    fn get_subsequent_chunk_id<'a>(&'a self, chunk_id: &'a str) -> BoxFuture<'a, Result<Adjacent>> {
        Box::pin(self.adjacent_chunk(chunk_id, ChainDirection::Subsequent))
    }

    fn get_previous_chunk_id<'a>(&'a self, chunk_id: &'a str) -> BoxFuture<'a, Result<Adjacent>> {
        Box::pin(self.adjacent_chunk(chunk_id, ChainDirection::Previous))
    }

    fn get_chunk<'a>(&'a self, chunk_id: &'a str) -> BoxFuture<'a, Result<Option<ChunkContent>>> {
        let chunk_id = chunk_id.to_string();
        Box::pin(self.db.with_connection(move |conn| {
            let chunk = conn
                .query_row(
                    "SELECT id, content FROM nodes WHERE id = ?1 AND kind = 'chunk'",
                    params![chunk_id],
                    |row| {
                        Ok(ChunkContent {
                            chunk_id: row.get(0)?,
                            text: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(chunk)
        }))
    }

    fn get_node_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Node>>> {
        let id = id.to_string();
        Box::pin(self.db.with_connection(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, kind, content, source, seq_index, embedding FROM nodes WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, Option<String>>(3)?,
                            row.get::<_, Option<i64>>(4)?,
                            row.get::<_, Option<Vec<u8>>>(5)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, kind, content, source, seq_index, embedding)) = row else {
                return Ok(None);
            };

            let node = match kind.parse::<NodeKind>()? {
                NodeKind::Document => Node::Document { id, content, source },
                NodeKind::Chunk => Node::Chunk {
                    id,
                    content,
                    index: seq_index.unwrap_or_default(),
                },
                NodeKind::AtomicFact => Node::AtomicFact { id, content },
                NodeKind::KeyElement => Node::KeyElement {
                    id,
                    content,
                    embedding: embedding.as_deref().and_then(parse_embedding),
                },
            };
            Ok(Some(node))
        }))
    }

    fn get_similar_nodes<'a>(&'a self, embedding: &'a [f32], k: usize) -> BoxFuture<'a, Result<Vec<SimilarNode>>> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let candidates = self
                .db
                .with_connection(|conn| {
                    let mut stmt = conn.prepare(
                        "SELECT id, embedding FROM nodes WHERE kind = 'key_element' AND embedding IS NOT NULL",
                    )?;
                    let mut rows = stmt.query([])?;
                    let mut out = Vec::new();
                    while let Some(row) = rows.next()? {
                        let id: String = row.get(0)?;
                        let blob: Vec<u8> = row.get(1)?;
                        match parse_embedding(&blob) {
                            Some(vector) => out.push((id, vector)),
                            None => log::warn!("Skipping key element {} with malformed embedding", id),
                        }
                    }
                    Ok::<Vec<(String, Vec<f32>)>, GraphReaderError>(out)
                })
                .await?;

            let scanned = candidates.len();
            let ranked = top_k_similar(embedding, candidates, k);
            log::debug!(
                "Similarity search scanned {} key elements in {:?}",
                scanned,
                start.elapsed()
            );
            Ok(ranked)
        })
    }
}

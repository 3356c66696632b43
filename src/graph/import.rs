use rusqlite::params;

use crate::db::Db;
use crate::error::{GraphReaderError, Result};
use crate::search::encode_embedding;

use super::model::{Edge, Graph, Node};

/// Counts reported by [`import_graph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Node rows inserted or merged.
    pub nodes: usize,
    /// Edges newly inserted.
    pub edges: usize,
    /// Edges skipped because they already existed or an endpoint is missing.
    pub skipped_edges: usize,
}

/// Node and edge counts for the `stats` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes_by_kind: Vec<(String, i64)>,
    pub edges_by_relationship: Vec<(String, i64)>,
    pub embedded_key_elements: i64,
}

/// Write a graph into the database.
///
/// Nodes are merged by id: content is refreshed, `source` and `seq_index` are
/// only filled when provided, and a stored embedding is never replaced.
/// Edges have set semantics; an edge whose endpoints are not both present is
/// skipped.
pub async fn import_graph(db: &Db, graph: &Graph) -> Result<ImportSummary> {
    let nodes: Vec<Node> = graph.nodes().cloned().collect();
    let edges: Vec<Edge> = graph.edges().cloned().collect();

    let summary = db
        .with_connection(move |conn| {
            let tx = conn.transaction()?;
            let mut summary = ImportSummary::default();

            {
                let mut insert_node = tx.prepare(
                    r#"
                    INSERT INTO nodes (id, kind, content, source, seq_index, embedding)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(id) DO UPDATE SET
                        content = excluded.content,
                        source = COALESCE(excluded.source, nodes.source),
                        seq_index = COALESCE(excluded.seq_index, nodes.seq_index),
                        embedding = COALESCE(nodes.embedding, excluded.embedding)
                    "#,
                )?;

                for node in &nodes {
                    let (source, seq_index, embedding) = match node {
                        Node::Document { source, .. } => (source.clone(), None, None),
                        Node::Chunk { index, .. } => (None, Some(*index), None),
                        Node::AtomicFact { .. } => (None, None, None),
                        Node::KeyElement { embedding, .. } => {
                            (None, None, embedding.as_deref().map(encode_embedding))
                        }
                    };
                    insert_node.execute(params![
                        node.id(),
                        node.kind().as_str(),
                        node.content(),
                        source,
                        seq_index,
                        embedding,
                    ])?;
                    summary.nodes += 1;
                }

                let mut insert_edge = tx.prepare(
                    r#"
                    INSERT OR IGNORE INTO edges (relationship, source_id, target_id)
                    SELECT ?1, ?2, ?3
                    WHERE EXISTS (SELECT 1 FROM nodes WHERE id = ?2)
                      AND EXISTS (SELECT 1 FROM nodes WHERE id = ?3)
                    "#,
                )?;

                for edge in &edges {
                    let inserted = insert_edge.execute(params![
                        edge.relationship.as_str(),
                        edge.source,
                        edge.target,
                    ])?;
                    if inserted > 0 {
                        summary.edges += 1;
                    } else {
                        summary.skipped_edges += 1;
                    }
                }
            }

            tx.commit()?;
            Ok::<ImportSummary, GraphReaderError>(summary)
        })
        .await?;

    log::info!(
        "Imported graph: {} nodes, {} new edges ({} skipped)",
        summary.nodes,
        summary.edges,
        summary.skipped_edges
    );
    Ok(summary)
}

/// Delete every node and edge.
pub async fn reset_graph(db: &Db) -> Result<()> {
    db.with_connection(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;
        tx.commit()?;
        Ok::<(), GraphReaderError>(())
    })
    .await?;
    log::info!("Graph reset");
    Ok(())
}

/// Count nodes per kind and edges per relationship.
pub async fn graph_stats(db: &Db) -> Result<GraphStats> {
    db.with_connection(|conn| {
        let mut stats = GraphStats::default();

        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM nodes GROUP BY kind ORDER BY kind")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            stats.nodes_by_kind.push((row.get(0)?, row.get(1)?));
        }

        let mut stmt = conn.prepare(
            "SELECT relationship, COUNT(*) FROM edges GROUP BY relationship ORDER BY relationship",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            stats.edges_by_relationship.push((row.get(0)?, row.get(1)?));
        }

        stats.embedded_key_elements = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE kind = 'key_element' AND embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        Ok::<GraphStats, GraphReaderError>(stats)
    })
    .await
}

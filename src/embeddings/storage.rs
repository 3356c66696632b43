use crate::db::Db;
use crate::error::{GraphReaderError, Result};
use crate::search::encode_embedding;
use rusqlite::params;

use super::Embedder;

/// Return (id, text) for every key element that has no embedding yet.
pub async fn key_elements_without_embedding(db: &Db) -> Result<Vec<(String, String)>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, content FROM nodes WHERE kind = 'key_element' AND embedding IS NULL ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok::<Vec<(String, String)>, GraphReaderError>(out)
    })
    .await
}

/// Store embeddings for key elements in one transaction.
///
/// An embedding is written only if the key element has none, so once set it
/// never changes. Returns the number of rows updated.
pub async fn store_key_element_embeddings(db: &Db, embeddings: Vec<(String, Vec<f32>)>) -> Result<usize> {
    if embeddings.is_empty() {
        return Ok(0);
    }

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let mut stored = 0;
        {
            let mut update = tx.prepare(
                "UPDATE nodes SET embedding = ?1 WHERE id = ?2 AND kind = 'key_element' AND embedding IS NULL",
            )?;
            for (id, embedding) in &embeddings {
                let rows = update.execute(params![encode_embedding(embedding), id])?;
                if rows == 0 {
                    log::debug!("Key element {} missing or already embedded", id);
                }
                stored += rows;
            }
        }
        tx.commit()?;
        Ok::<usize, GraphReaderError>(stored)
    })
    .await
}

/// Embed every key element that lacks an embedding, `batch_size` at a time.
///
/// Each batch is committed before the next request, so an interrupted run
/// resumes where it stopped.
pub async fn embed_missing_key_elements(db: &Db, embedder: &dyn Embedder, batch_size: usize) -> Result<usize> {
    let pending = key_elements_without_embedding(db).await?;
    if pending.is_empty() {
        log::info!("All key elements already have embeddings");
        return Ok(0);
    }
    log::info!("Embedding {} key elements", pending.len());

    let mut stored = 0;
    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(GraphReaderError::Embedding(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            )));
        }
        let pairs = batch.iter().map(|(id, _)| id.clone()).zip(embeddings).collect();
        stored += store_key_element_embeddings(db, pairs).await?;
        log::info!("Stored {}/{} key element embeddings", stored, pending.len());
    }
    Ok(stored)
}

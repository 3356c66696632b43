use serde::{Deserialize, Serialize};

/// A key element ranked by cosine similarity to a query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarNode {
    pub id: String,
    pub similarity: f32,
}

/// Rank candidate embeddings against `query_vec` and keep the best `k`.
///
/// Candidates whose dimension differs from the query are skipped. Ties keep
/// candidate order.
pub fn top_k_similar(
    query_vec: &[f32],
    candidates: impl IntoIterator<Item = (String, Vec<f32>)>,
    k: usize,
) -> Vec<SimilarNode> {
    let mut scored: Vec<SimilarNode> = candidates
        .into_iter()
        .filter(|(_, embedding)| embedding.len() == query_vec.len())
        .map(|(id, embedding)| SimilarNode {
            similarity: cosine_similarity(query_vec, &embedding),
            id,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

/// Encode an embedding as a little-endian f32 BLOB
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Parse embedding BLOB to Vec<f32>
///
/// Returns None if the BLOB length is not a multiple of 4.
pub fn parse_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }

    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// Compute cosine similarity between two vectors
///
/// Returns 0.0 if either vector has zero magnitude.
///
/// # Panics
///
/// Panics if vectors have different lengths (callers filter by dimension first)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "Vectors must have same length for cosine similarity"
    );

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

pub mod openai;
pub mod storage;

use futures_util::future::BoxFuture;

use crate::error::Result;

pub use openai::OpenAIEmbedder;
pub use storage::{embed_missing_key_elements, key_elements_without_embedding, store_key_element_embeddings};

/// Turns text into vectors comparable with the stored key-element embeddings.
pub trait Embedder: Send + Sync {
    /// Embed a single text (queries, plans, escalation rationales).
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;

    /// Embed many texts, one vector per input in input order.
    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

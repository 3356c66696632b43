//! Nearest-neighbor ranking over stored key-element embeddings.

pub mod vector;

pub use vector::{cosine_similarity, encode_embedding, parse_embedding, top_k_similar, SimilarNode};

//! Ensures every Article has exactly one Embedding.

pub mod client;
pub mod embedder;

pub use client::{EmbeddingClient, EmbeddingClientError};
pub use embedder::{Embedder, EmbedderConfig};

//! Capabilities the question answering flow depends on.
//!
//! Each backend (embedding model, vector index, language model) is used through one of these traits,
//! so it can be swapped for another implementation, or for a fake in tests.
pub mod completion_client;
pub mod embedder;
pub mod vector_index;

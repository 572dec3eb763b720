pub mod completion_groq_repository;
pub mod huggingface_embedder;
pub mod professor_pinecone_repository;
pub mod professor_qdrant_repository;

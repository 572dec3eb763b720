pub mod embedding;
pub mod message;
pub mod professor_match;

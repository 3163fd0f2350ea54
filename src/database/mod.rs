// Database module
// SQLite holds the paper registry, LanceDB holds the chunk embeddings

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{ChunkMetadata, EmbeddingRecord, RelevantChunk, VectorStore};
pub use sqlite::{Database, NewPaper, Paper, PaperQueries, PaperStatus};

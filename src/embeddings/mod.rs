// Embeddings module
// Paper chunking, tokenization and Ollama integration

pub mod chunking;
pub mod ollama;
pub mod tokenizer;

pub use chunking::{ChunkingConfig, PaperChunk, Section, chunk_paper, detect_section};
pub use ollama::{EmbeddingResult, OllamaClient};
pub use tokenizer::{
    CharTokenizer, Cl100kTokenizer, HuggingFaceTokenizer, Tokenizer, tokenizer_from_path,
};

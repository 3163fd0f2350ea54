// LanceDB vector database module
// Stores chunk embeddings and answers similarity queries scoped to one paper


pub mod vector_store;

use serde::{Deserialize, Serialize};

use crate::embeddings::chunking::{PaperChunk, Section};
use crate::{PaperError, Result};

pub use vector_store::VectorStore;

/// Embedding record stored in LanceDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Same value as `metadata.chunk_id`
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Metadata for a chunk stored alongside its embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub paper_id: String,
    pub paper_title: String,
    pub section: Section,
    /// 1-based page the chunk was cut from
    pub page_number: u32,
    pub chunk_index: u32,
    pub content: String,
    /// RFC 3339 timestamp
    pub created_at: String,
}

/// A chunk returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct RelevantChunk {
    pub chunk_id: String,
    pub content: String,
    pub section: Section,
    pub page_number: u32,
    pub chunk_index: u32,
    pub distance: f32,
    /// `1 - distance`
    pub similarity: f32,
}

impl EmbeddingRecord {
    /// Pair a chunk with its embedding
    #[inline]
    pub fn from_chunk(
        chunk: &PaperChunk,
        paper_title: &str,
        vector: Vec<f32>,
        created_at: &str,
    ) -> Result<Self> {
        let page_number = u32::try_from(chunk.page_number)
            .map_err(|_| PaperError::Database(format!("Page number {} overflows", chunk.page_number)))?;
        let chunk_index = u32::try_from(chunk.chunk_index)
            .map_err(|_| PaperError::Database(format!("Chunk index {} overflows", chunk.chunk_index)))?;

        Ok(Self {
            id: chunk.chunk_id.clone(),
            vector,
            metadata: ChunkMetadata {
                chunk_id: chunk.chunk_id.clone(),
                paper_id: chunk.paper_id.clone(),
                paper_title: paper_title.to_string(),
                section: chunk.section,
                page_number,
                chunk_index,
                content: chunk.content.clone(),
                created_at: created_at.to_string(),
            },
        })
    }
}

impl From<(ChunkMetadata, f32)> for RelevantChunk {
    #[inline]
    fn from((metadata, distance): (ChunkMetadata, f32)) -> Self {
        Self {
            chunk_id: metadata.chunk_id,
            content: metadata.content,
            section: metadata.section,
            page_number: metadata.page_number,
            chunk_index: metadata.chunk_index,
            distance,
            similarity: 1.0 - distance,
        }
    }
}

/// Reject paper ids that cannot be embedded in a filter predicate as-is
#[inline]
pub fn validate_paper_id(paper_id: &str) -> Result<&str> {
    let well_formed = !paper_id.is_empty()
        && paper_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '/' | '_'));

    if well_formed {
        Ok(paper_id)
    } else {
        Err(PaperError::Database(format!("Invalid paper id: {paper_id:?}")))
    }
}

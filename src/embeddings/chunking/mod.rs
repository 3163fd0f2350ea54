#[cfg(test)]
mod tests;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::ConfigError;
use crate::embeddings::tokenizer::Tokenizer;
use crate::pdf::PageText;
use crate::{PaperError, Result};

/// Number of leading characters inspected when classifying a page
pub const SECTION_SCAN_CHARS: usize = 500;

/// Coarse role of a page within the paper's structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Abstract,
    Introduction,
    RelatedWork,
    Methodology,
    Experiments,
    Results,
    Discussion,
    Conclusion,
    References,
    Content,
}

/// Trigger phrases per section, in priority order. The first section with a
/// matching phrase wins, so the order of this table is significant.
const SECTION_KEYWORDS: &[(Section, &[&str])] = &[
    (Section::Abstract, &["abstract"]),
    (
        Section::Introduction,
        &["introduction", "1. introduction", "1 introduction"],
    ),
    (
        Section::RelatedWork,
        &["related work", "background", "literature review"],
    ),
    (
        Section::Methodology,
        &["methodology", "methods", "approach", "model"],
    ),
    (
        Section::Experiments,
        &["experiments", "experimental", "evaluation"],
    ),
    (Section::Results, &["results", "findings"]),
    (Section::Discussion, &["discussion", "analysis"]),
    (Section::Conclusion, &["conclusion", "concluding"]),
    (Section::References, &["references", "bibliography"]),
];

impl Section {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Abstract => "abstract",
            Section::Introduction => "introduction",
            Section::RelatedWork => "related_work",
            Section::Methodology => "methodology",
            Section::Experiments => "experiments",
            Section::Results => "results",
            Section::Discussion => "discussion",
            Section::Conclusion => "conclusion",
            Section::References => "references",
            Section::Content => "content",
        }
    }
}

impl fmt::Display for Section {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = PaperError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        SECTION_KEYWORDS
            .iter()
            .map(|(section, _)| *section)
            .chain(std::iter::once(Section::Content))
            .find(|section| section.as_str() == s)
            .ok_or_else(|| PaperError::Chunking(format!("Unknown section label: {}", s)))
    }
}

/// A bounded span of a paper's text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperChunk {
    /// `{paper_id}_chunk_{chunk_index}`
    pub chunk_id: String,
    pub paper_id: String,
    pub content: String,
    pub section: Section,
    /// Position of this chunk within the whole paper, starting at 0
    pub chunk_index: usize,
    /// 1-based page the chunk was cut from
    pub page_number: usize,
}

/// Configuration for paper chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in tokens
    pub chunk_size: usize,
    /// Tokens shared by consecutive chunks of the same page
    pub overlap: usize,
    /// Chunks whose trimmed text has fewer characters than this are dropped
    pub min_content_length: usize,
    /// Optional `tokenizer.json`; `cl100k_base` is used without one
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            min_content_length: 100,
            tokenizer_path: None,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of consecutive windows
    #[inline]
    pub fn step(&self) -> Result<usize, ConfigError> {
        self.validate()?;
        Ok(self.chunk_size - self.overlap)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(self.overlap, self.chunk_size));
        }

        Ok(())
    }
}

/// Guess which section of the paper a page belongs to
#[inline]
pub fn detect_section(text: &str) -> Section {
    let head: String = text
        .to_lowercase()
        .chars()
        .take(SECTION_SCAN_CHARS)
        .collect();

    SECTION_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| head.contains(kw)))
        .map_or(Section::Content, |(section, _)| *section)
}

#[inline]
pub fn chunk_id(paper_id: &str, chunk_index: usize) -> String {
    format!("{}_chunk_{}", paper_id, chunk_index)
}

/// Shorten decoded text until it retokenizes to at most `chunk_size` tokens.
///
/// A window whose ids were not the canonical encoding of its own text can
/// grow when encoded again; the text is cut back to a prefix of its own
/// encoding until it fits.
fn fit_to_window(
    mut content: String,
    chunk_size: usize,
    tokenizer: &dyn Tokenizer,
) -> Result<String> {
    let mut budget = chunk_size;

    loop {
        let retokenized = tokenizer.encode(&content)?;
        if retokenized.len() <= chunk_size {
            return Ok(content);
        }

        trace!(
            "Window retokenized to {} tokens, trimming to {}",
            retokenized.len(),
            budget
        );
        content = tokenizer.decode(&retokenized[..budget])?;
        budget = budget.saturating_sub(1);
    }
}

/// Split a paper's pages into overlapping, section-tagged chunks
#[inline]
pub fn chunk_paper(
    pages: &[PageText],
    paper_id: &str,
    config: &ChunkingConfig,
    tokenizer: &dyn Tokenizer,
) -> Result<Vec<PaperChunk>> {
    let step = config.step()?;

    let mut chunks = Vec::new();
    let mut chunk_index = 0;

    for page in pages {
        let section = detect_section(&page.text);
        let tokens = tokenizer.encode(&page.text)?;

        for start in (0..tokens.len()).step_by(step) {
            let end = (start + config.chunk_size).min(tokens.len());
            let content = fit_to_window(
                tokenizer.decode(&tokens[start..end])?,
                config.chunk_size,
                tokenizer,
            )?;

            if content.trim().chars().count() < config.min_content_length {
                continue;
            }

            chunks.push(PaperChunk {
                chunk_id: chunk_id(paper_id, chunk_index),
                paper_id: paper_id.to_string(),
                content,
                section,
                chunk_index,
                page_number: page.page_number,
            });
            chunk_index += 1;
        }
    }

    debug!(
        "Chunked paper {} ({} pages) into {} chunks",
        paper_id,
        pages.len(),
        chunks.len()
    );

    Ok(chunks)
}

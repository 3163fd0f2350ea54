
use std::path::Path;
use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tracing::{debug, info, trace};

use crate::{PaperError, Result};

/// Reversible text tokenization used to bound chunk sizes.
///
/// Decoding the ids produced by `encode` must reproduce the original text,
/// allowing for minor whitespace normalization.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

/// Treats every Unicode scalar value as one token.
///
/// Any window of ids decodes to whole characters, so text always
/// round-trips exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    #[inline]
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(text.chars().map(u32::from).collect())
    }

    #[inline]
    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens
            .iter()
            .map(|&token| {
                char::from_u32(token).ok_or_else(|| {
                    PaperError::Tokenizer(format!("Token id {} is not a character", token))
                })
            })
            .collect()
    }
}

/// Most tokens a single character can be split across in a byte-level BPE
const MAX_CHARACTER_FRAGMENTS: usize = 3;

/// The `cl100k_base` BPE used by GPT-4 and its embedding models
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    #[inline]
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
            PaperError::Tokenizer(format!("Failed to load cl100k_base encoding: {}", e))
        })?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for Cl100kTokenizer {
    #[inline]
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self.bpe.encode_ordinary(text))
    }

    /// Decode a span of ids, dropping the partial characters a window edge
    /// may have cut through.
    ///
    /// Multi-byte characters can span several byte-level tokens, so only
    /// the outermost `MAX_CHARACTER_FRAGMENTS` ids on each side are ever
    /// dropped.
    #[inline]
    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let mut last_error = None;

        for dropped in 0..=2 * MAX_CHARACTER_FRAGMENTS {
            for leading in 0..=dropped.min(MAX_CHARACTER_FRAGMENTS) {
                let trailing = dropped - leading;
                if trailing > MAX_CHARACTER_FRAGMENTS || dropped > tokens.len() {
                    continue;
                }

                match self.bpe.decode(tokens[leading..tokens.len() - trailing].to_vec()) {
                    Ok(text) => {
                        if dropped > 0 {
                            trace!(
                                "Dropped {} leading and {} trailing partial tokens",
                                leading, trailing
                            );
                        }
                        return Ok(text);
                    }
                    Err(e) => last_error = Some(e.to_string()),
                }
            }
        }

        Err(PaperError::Tokenizer(format!(
            "Failed to decode tokens: {}",
            last_error.unwrap_or_else(|| "no decodable span".to_string())
        )))
    }
}

/// Subword tokenizer backed by a Hugging Face `tokenizer.json` file
pub struct HuggingFaceTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HuggingFaceTokenizer {
    #[inline]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading tokenizer from {}", path.display());

        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            PaperError::Tokenizer(format!(
                "Failed to load tokenizer from {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self { inner })
    }
}

impl Tokenizer for HuggingFaceTokenizer {
    #[inline]
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| PaperError::Tokenizer(format!("Failed to encode text: {}", e)))?;
        Ok(encoding.get_ids().to_vec())
    }

    #[inline]
    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.inner
            .decode(tokens, false)
            .map_err(|e| PaperError::Tokenizer(format!("Failed to decode tokens: {}", e)))
    }
}

/// Pick the tokenizer described by the chunking configuration
#[inline]
pub fn tokenizer_from_path(path: Option<&Path>) -> Result<Arc<dyn Tokenizer>> {
    match path {
        Some(path) => {
            let tokenizer = HuggingFaceTokenizer::from_file(path)?;
            info!("Using subword tokenizer from {}", path.display());
            Ok(Arc::new(tokenizer))
        }
        None => {
            debug!("No tokenizer file configured, using cl100k_base");
            Ok(Arc::new(Cl100kTokenizer::new()?))
        }
    }
}

// Ingestion pipeline
// arXiv metadata -> PDF -> pages -> chunks -> embeddings -> vector store

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::arxiv::{ArxivClient, PaperMetadata, extract_arxiv_id};
use crate::config::Config;
use crate::database::lancedb::{EmbeddingRecord, RelevantChunk, VectorStore};
use crate::database::sqlite::{Database, NewPaper, PaperStatus};
use crate::embeddings::chunking::{PaperChunk, chunk_paper};
use crate::embeddings::ollama::OllamaClient;
use crate::embeddings::tokenizer::{Tokenizer, tokenizer_from_path};
use crate::pdf::{PageText, extract_pages};
use crate::{PaperError, Result};

/// Outcome of ingesting one paper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub metadata: PaperMetadata,
    pub page_count: usize,
    pub chunk_count: usize,
}

/// Snapshot of both stores
#[derive(Debug, Clone, PartialEq)]
pub struct StoreStatus {
    pub papers_by_status: Vec<(PaperStatus, i64)>,
    pub total_chunks: usize,
    pub vector_dimension: usize,
    pub vector_store_healthy: bool,
}

pub struct Ingestor {
    config: Config,
    database: Database,
    vector_store: VectorStore,
    arxiv: ArxivClient,
    ollama: OllamaClient,
    tokenizer: Arc<dyn Tokenizer>,
}

impl Ingestor {
    #[inline]
    pub async fn new(config: Config) -> Result<Self> {
        let database = Database::from_config(&config).await?;
        let vector_store = VectorStore::new(&config).await?;
        let arxiv = ArxivClient::new(&config)?;
        let ollama = OllamaClient::new(&config)?;
        let tokenizer = tokenizer_from_path(config.chunking.tokenizer_path.as_deref())?;

        Ok(Self::from_parts(
            config,
            database,
            vector_store,
            arxiv,
            ollama,
            tokenizer,
        ))
    }

    #[inline]
    pub fn from_parts(
        config: Config,
        database: Database,
        vector_store: VectorStore,
        arxiv: ArxivClient,
        ollama: OllamaClient,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        Self {
            config,
            database,
            vector_store,
            arxiv,
            ollama,
            tokenizer,
        }
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn vector_store(&self) -> &VectorStore {
        &self.vector_store
    }

    /// Ingest a paper given its id or arXiv URL.
    ///
    /// Once the paper is registered, any failure marks it `failed` with the
    /// error message before the error is returned.
    #[inline]
    pub async fn ingest(&mut self, input: &str) -> Result<IngestReport> {
        let arxiv_id = extract_arxiv_id(input);
        info!("Ingesting paper {}", arxiv_id);

        let arxiv = self.arxiv.clone();
        let lookup = arxiv_id.clone();
        let metadata = run_blocking(move || arxiv.fetch_metadata(&lookup)).await?;

        self.database
            .register_paper(NewPaper::from(&metadata))
            .await?;
        self.database.mark_ingesting(&metadata.arxiv_id).await?;

        match self.download_and_store(&metadata).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!("Ingestion of {} failed: {}", metadata.arxiv_id, e);
                if let Err(mark_err) = self
                    .database
                    .mark_failed(&metadata.arxiv_id, &e.to_string())
                    .await
                {
                    warn!(
                        "Could not record failure for {}: {}",
                        metadata.arxiv_id, mark_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn download_and_store(&mut self, metadata: &PaperMetadata) -> Result<IngestReport> {
        let arxiv = self.arxiv.clone();
        let pdf_url = metadata.pdf_url.clone();
        let bytes = run_blocking(move || arxiv.download_pdf(&pdf_url)).await?;

        let pages = run_blocking(move || extract_pages(&bytes)).await?;

        self.store_pages(metadata, &pages).await
    }

    /// Chunk, embed and store already extracted pages, replacing whatever
    /// the vector store held for this paper.
    ///
    /// When the embedding width no longer matches the store, the other
    /// completed papers lose their chunks and are marked failed.
    #[inline]
    pub async fn store_pages(
        &mut self,
        metadata: &PaperMetadata,
        pages: &[PageText],
    ) -> Result<IngestReport> {
        let chunks = chunk_paper(
            pages,
            &metadata.arxiv_id,
            &self.config.chunking,
            self.tokenizer.as_ref(),
        )?;

        if chunks.is_empty() {
            warn!("Paper {} produced no chunks", metadata.arxiv_id);
        }

        let records = self.embed_chunks(metadata, &chunks).await?;

        self.vector_store.delete_paper(&metadata.arxiv_id).await?;
        if self.vector_store.add_paper_chunks(records).await? {
            let reason = format!(
                "Embedding dimension changed to {}; re-ingest required",
                self.vector_store.vector_dimension()
            );
            self.database
                .invalidate_other_papers(&metadata.arxiv_id, &reason)
                .await?;
        }

        self.database
            .mark_completed(
                &metadata.arxiv_id,
                i64::try_from(pages.len()).unwrap_or(i64::MAX),
                i64::try_from(chunks.len()).unwrap_or(i64::MAX),
            )
            .await?;

        info!(
            "Ingested {}: {} pages, {} chunks",
            metadata.arxiv_id,
            pages.len(),
            chunks.len()
        );

        Ok(IngestReport {
            metadata: metadata.clone(),
            page_count: pages.len(),
            chunk_count: chunks.len(),
        })
    }

    async fn embed_chunks(
        &self,
        metadata: &PaperMetadata,
        chunks: &[PaperChunk],
    ) -> Result<Vec<EmbeddingRecord>> {
        let batch_size = (self.config.ollama.batch_size as usize).max(1);
        let created_at = Utc::now().to_rfc3339();

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };
        bar.set_message(metadata.arxiv_id.clone());

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            let ollama = self.ollama.clone();
            let owned = batch.to_vec();
            let embeddings =
                run_blocking(move || Ok(ollama.generate_chunk_embeddings(&owned)?)).await?;

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                records.push(EmbeddingRecord::from_chunk(
                    chunk,
                    &metadata.title,
                    embedding.embedding,
                    &created_at,
                )?);
            }

            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} chunks", records.len(), chunks.len());
        }

        bar.finish_and_clear();
        Ok(records)
    }

    /// Chunks of an ingested paper most similar to `query`
    #[inline]
    pub async fn search(
        &self,
        paper: &str,
        query: &str,
        n_results: usize,
    ) -> Result<Vec<RelevantChunk>> {
        let arxiv_id = extract_arxiv_id(paper);

        if self.vector_store.count_paper_chunks(&arxiv_id).await? == 0 {
            return Err(PaperError::NotFound(format!(
                "No chunks stored for paper {}",
                arxiv_id
            )));
        }

        let ollama = self.ollama.clone();
        let query = query.to_string();
        let embedding = run_blocking(move || Ok(ollama.generate_embedding(&query)?)).await?;

        self.vector_store
            .search_relevant_chunks(&embedding.embedding, &arxiv_id, n_results)
            .await
    }

    /// Remove a paper's vectors and registry row; false if neither existed
    #[inline]
    pub async fn delete(&self, paper: &str) -> Result<bool> {
        let arxiv_id = extract_arxiv_id(paper);

        let had_chunks = self.vector_store.count_paper_chunks(&arxiv_id).await? > 0;
        self.vector_store.delete_paper(&arxiv_id).await?;
        let had_row = self.database.delete_paper(&arxiv_id).await?;

        info!("Deleted paper {}", arxiv_id);
        Ok(had_chunks || had_row)
    }

    #[inline]
    pub async fn status(&self) -> Result<StoreStatus> {
        Ok(StoreStatus {
            papers_by_status: self.database.count_by_status().await?,
            total_chunks: self.vector_store.count_chunks().await?,
            vector_dimension: self.vector_store.vector_dimension(),
            vector_store_healthy: self.vector_store.validate_integrity().await,
        })
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PaperError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))?
}

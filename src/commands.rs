use anyhow::{Context, Result};
use dialoguer::Confirm;
use tracing::{error, info};

use crate::arxiv::{extract_arxiv_id, is_arxiv_or_url};
use crate::config::Config;
use crate::database::lancedb::{RelevantChunk, VectorStore};
use crate::database::sqlite::{Database, Paper};
use crate::embeddings::ollama::OllamaClient;
use crate::ingest::Ingestor;

const PREVIEW_CHARS: usize = 240;

/// Ingest a paper by id or arXiv URL
#[inline]
pub async fn ingest_paper(config: Config, input: &str) -> Result<()> {
    if !is_arxiv_or_url(input) {
        return Err(anyhow::anyhow!(
            "'{}' is not an arXiv id (e.g. 1706.03762) or arXiv URL",
            input
        ));
    }

    let mut ingestor = Ingestor::new(config)
        .await
        .context("Failed to initialize ingestion pipeline")?;

    println!("📄 Ingesting {}", extract_arxiv_id(input));

    match ingestor.ingest(input).await {
        Ok(report) => {
            println!("✅ {}", report.metadata.title);
            println!("   Authors: {}", report.metadata.authors.join(", "));
            println!("   Published: {}", report.metadata.published_date);
            println!("   Pages: {}", report.page_count);
            println!("   Chunks: {}", report.chunk_count);
            Ok(())
        }
        Err(e) => {
            error!("Ingestion failed: {}", e);
            Err(e).context("Ingestion failed")
        }
    }
}

/// List registered papers
#[inline]
pub async fn list_papers(config: &Config) -> Result<()> {
    let database = Database::from_config(config)
        .await
        .context("Failed to initialize database")?;

    let papers = database.list_papers().await?;

    if papers.is_empty() {
        println!("No papers have been ingested yet.");
        println!("Use 'paper-assistant ingest <arxiv-id>' to add one.");
        return Ok(());
    }

    println!("Papers ({} total):", papers.len());
    println!();

    for paper in &papers {
        print_paper(paper);
        println!();
    }

    let completed = papers.iter().filter(|p| p.is_completed()).count();
    let failed = papers.iter().filter(|p| p.is_failed()).count();

    println!("Summary:");
    println!("  Total Papers: {}", papers.len());
    println!("  Completed: {}", completed);
    println!("  Failed: {}", failed);

    Ok(())
}

fn print_paper(paper: &Paper) {
    println!("📚 {} ({})", paper.title, paper.arxiv_id);

    let authors = paper.author_list();
    if !authors.is_empty() {
        println!("   Authors: {}", authors.join(", "));
    }
    println!("   Published: {}", paper.published_date);
    println!("   Status: {}", paper.status);

    if paper.is_completed() {
        println!(
            "   Pages: {}  Chunks: {}",
            paper.page_count, paper.chunk_count
        );
    }

    if let Some(ingested) = paper.ingested_date {
        println!("   Ingested: {}", ingested.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(error) = &paper.error_message {
        println!("   ⚠️  Error: {}", error);
    }
}

/// Print the passages of a paper most relevant to `query`
#[inline]
pub async fn search_paper(config: Config, paper: &str, query: &str, limit: usize) -> Result<()> {
    let ingestor = Ingestor::new(config)
        .await
        .context("Failed to initialize search")?;

    let results = ingestor.search(paper, query, limit).await?;

    if results.is_empty() {
        println!("No relevant passages found.");
        return Ok(());
    }

    for (rank, chunk) in results.iter().enumerate() {
        println!("{}", format_result(rank + 1, chunk));
        println!();
    }

    Ok(())
}

fn format_result(rank: usize, chunk: &RelevantChunk) -> String {
    format!(
        "{}. [{} | page {} | similarity {:.3}] {}\n   {}",
        rank,
        chunk.section,
        chunk.page_number,
        chunk.similarity,
        chunk.chunk_id,
        preview(&chunk.content, PREVIEW_CHARS)
    )
}

/// First `max_chars` characters of `text` on one line
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if flat.chars().count() <= max_chars {
        flat
    } else {
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

/// Delete a paper's chunks and registry entry
#[inline]
pub async fn delete_paper(config: Config, paper: &str, assume_yes: bool) -> Result<()> {
    let arxiv_id = extract_arxiv_id(paper);

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!("Delete {} and all its stored chunks?", arxiv_id))
            .default(false)
            .interact()?
    {
        println!("Nothing deleted.");
        return Ok(());
    }

    let ingestor = Ingestor::new(config).await?;

    if ingestor.delete(&arxiv_id).await? {
        info!("Deleted paper {}", arxiv_id);
        println!("✓ Deleted {}", arxiv_id);
    } else {
        println!("Paper not found: {}", arxiv_id);
    }

    Ok(())
}

/// Show health of Ollama and both stores
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Paper Assistant Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Paper Registry:");
    match Database::from_config(config).await {
        Ok(database) => {
            println!("   ✅ SQLite: {}", config.database_path().display());
            for (status, count) in database.count_by_status().await? {
                println!("   {}: {}", status, count);
            }
        }
        Err(e) => println!("   ❌ SQLite: Failed to open - {}", e),
    }
    println!();

    println!("🤖 Ollama Status:");
    let client = OllamaClient::new(config)?;
    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task failed")?;
    match health {
        Ok(()) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
            println!("   📋 Model: {}", config.ollama.model);
        }
        Err(e) => println!("   ⚠️  Ollama: Unavailable - {}", e),
    }
    println!();

    println!("🔍 Vector Database Status:");
    match VectorStore::new(config).await {
        Ok(store) => {
            let healthy = store.validate_integrity().await;
            println!(
                "   {} LanceDB: {}",
                if healthy { "✅" } else { "❌" },
                config.vector_database_path().display()
            );
            if healthy {
                println!("   🧩 Chunks: {}", store.count_chunks().await?);
            }
            println!("   📐 Dimension: {}", store.vector_dimension());
        }
        Err(e) => println!("   ❌ LanceDB: Failed to open - {}", e),
    }

    Ok(())
}

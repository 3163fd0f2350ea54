#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use paper_assistant::config::OllamaConfig;
use paper_assistant::embeddings::chunking::{PaperChunk, Section};
use paper_assistant::embeddings::ollama::OllamaClient;
use serial_test::serial;
use std::env;
use std::time::Duration;
use tracing::info;

const TEST_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn create_integration_test_client() -> OllamaClient {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    let config = OllamaConfig {
        host,
        port,
        model,
        batch_size: 2,
        ..OllamaConfig::default()
    };

    OllamaClient::from_ollama_config(&config)
        .expect("Failed to create Ollama client")
        .with_timeout(Duration::from_secs(60))
        .with_retry_attempts(3)
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

fn chunk(index: usize, section: Section, content: &str) -> PaperChunk {
    PaperChunk {
        chunk_id: format!("1706.03762_chunk_{index}"),
        paper_id: "1706.03762".to_string(),
        content: content.to_string(),
        section,
        chunk_index: index,
        page_number: index + 1,
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b)
}

#[test]
#[serial]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();
    let result = client.health_check();

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[serial]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_chunk_embeddings() {
    init_test_tracing();

    let client = create_integration_test_client();
    let chunks = vec![
        chunk(0, Section::Abstract, "We propose the Transformer, based solely on attention."),
        chunk(1, Section::Methodology, "Multi-head attention runs several attention layers in parallel."),
        chunk(2, Section::References, "Sepp Hochreiter and Jurgen Schmidhuber. Long short-term memory."),
    ];

    let results = client
        .generate_chunk_embeddings(&chunks)
        .expect("embeddings should be generated");

    assert_eq!(results.len(), chunks.len());
    let dimension = results[0].embedding.len();
    assert!(dimension > 0);

    for (result, chunk) in results.iter().zip(&chunks) {
        assert_eq!(result.embedding.len(), dimension);
        assert_eq!(result.chunk_id.as_deref(), Some(chunk.chunk_id.as_str()));
        assert_eq!(result.chunk_index, Some(chunk.chunk_index));
    }

    info!("Generated {} embeddings of {} dimensions", results.len(), dimension);
}

#[test]
#[serial]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_related_text_is_closer() {
    init_test_tracing();

    let client = create_integration_test_client();
    let query = client
        .generate_embedding("How does multi-head attention work?")
        .expect("query embedding");
    let related = client
        .generate_embedding("Multi-head attention projects queries, keys and values h times.")
        .expect("related embedding");
    let unrelated = client
        .generate_embedding("The bibliography lists forty references in alphabetical order.")
        .expect("unrelated embedding");

    assert!(
        cosine(&query.embedding, &related.embedding)
            > cosine(&query.embedding, &unrelated.embedding)
    );
}

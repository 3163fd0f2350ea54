use super::*;
use crate::config::{ArxivConfig, OllamaConfig};
use crate::embeddings::chunking::{ChunkingConfig, Section};
use crate::embeddings::tokenizer::CharTokenizer;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIM: usize = 4;

struct Harness {
    _temp_dir: TempDir,
    server: MockServer,
    ingestor: Ingestor,
}

async fn harness() -> Harness {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let server = MockServer::start().await;
    let address = server.address();

    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            host: address.ip().to_string(),
            port: address.port(),
            model: "test-model".to_string(),
            batch_size: 1,
            ..OllamaConfig::default()
        },
        chunking: ChunkingConfig {
            chunk_size: 200,
            overlap: 50,
            min_content_length: 20,
            tokenizer_path: None,
        },
        arxiv: ArxivConfig {
            base_url: server.uri(),
            retry_attempts: 1,
            ..ArxivConfig::default()
        },
    };

    let database = Database::from_config(&config)
        .await
        .expect("database should open");
    let vector_store = VectorStore::open(&config.vector_database_path(), DIM)
        .await
        .expect("vector store should open");
    let arxiv = ArxivClient::new(&config).expect("arxiv client");
    let ollama = OllamaClient::new(&config)
        .expect("ollama client")
        .with_retry_attempts(1);

    let ingestor = Ingestor::from_parts(
        config,
        database,
        vector_store,
        arxiv,
        ollama,
        Arc::new(CharTokenizer),
    );

    Harness {
        _temp_dir: temp_dir,
        server,
        ingestor,
    }
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0, 0.0, 0.0]]
        })))
        .mount(server)
        .await;
}

fn metadata() -> PaperMetadata {
    PaperMetadata {
        arxiv_id: "1706.03762".to_string(),
        title: "Attention Is All You Need".to_string(),
        authors: vec!["Ashish Vaswani".to_string()],
        published_date: "2017-06-12".to_string(),
        abstract_text: "The dominant sequence transduction models".to_string(),
        pdf_url: "https://arxiv.org/pdf/1706.03762".to_string(),
    }
}

/// Two chunks from page 1, none from the blank page 2, two from page 3
fn pages() -> Vec<PageText> {
    vec![
        PageText {
            page_number: 1,
            text: format!("Abstract {}", "lorem ".repeat(50)),
        },
        PageText {
            page_number: 2,
            text: String::new(),
        },
        PageText {
            page_number: 3,
            text: format!("Introduction {}", "ipsum ".repeat(30)),
        },
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn store_pages_embeds_and_records_completion() {
    let mut h = harness().await;
    mount_embeddings(&h.server).await;

    h.ingestor
        .database()
        .register_paper(NewPaper::from(&metadata()))
        .await
        .expect("register");

    let report = h
        .ingestor
        .store_pages(&metadata(), &pages())
        .await
        .expect("pages should be stored");

    assert_eq!(report.page_count, 3);
    assert_eq!(report.chunk_count, 4);
    assert_eq!(
        h.ingestor
            .vector_store()
            .count_paper_chunks("1706.03762")
            .await
            .expect("count"),
        4
    );

    let paper = h
        .ingestor
        .database()
        .get_paper("1706.03762")
        .await
        .expect("lookup")
        .expect("paper should exist");
    assert_eq!(paper.status, PaperStatus::Completed);
    assert_eq!(paper.page_count, 3);
    assert_eq!(paper.chunk_count, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn reingesting_replaces_previous_chunks() {
    let mut h = harness().await;
    mount_embeddings(&h.server).await;

    h.ingestor
        .store_pages(&metadata(), &pages())
        .await
        .expect("first ingest");
    h.ingestor
        .store_pages(&metadata(), &pages()[..1])
        .await
        .expect("second ingest");

    assert_eq!(
        h.ingestor
            .vector_store()
            .count_paper_chunks("1706.03762")
            .await
            .expect("count"),
        2
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn search_returns_chunks_of_the_paper() {
    let mut h = harness().await;
    mount_embeddings(&h.server).await;

    h.ingestor
        .store_pages(&metadata(), &pages())
        .await
        .expect("ingest");

    let results = h
        .ingestor
        .search("https://arxiv.org/abs/1706.03762v7", "what is attention?", 3)
        .await
        .expect("search");

    assert_eq!(results.len(), 3);
    assert!(
        results
            .iter()
            .all(|r| r.chunk_id.starts_with("1706.03762_chunk_"))
    );
    assert!(
        results
            .iter()
            .any(|r| r.section == Section::Abstract || r.section == Section::Introduction)
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn search_unknown_paper_is_not_found() {
    let h = harness().await;

    let result = h.ingestor.search("2005.14165", "anything", 3).await;
    assert!(matches!(result, Err(PaperError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_vectors_and_registry_row() {
    let mut h = harness().await;
    mount_embeddings(&h.server).await;

    h.ingestor
        .database()
        .register_paper(NewPaper::from(&metadata()))
        .await
        .expect("register");
    h.ingestor
        .store_pages(&metadata(), &pages())
        .await
        .expect("ingest");

    assert!(h.ingestor.delete("1706.03762").await.expect("delete"));
    assert!(!h.ingestor.delete("1706.03762").await.expect("delete again"));

    let status = h.ingestor.status().await.expect("status");
    assert_eq!(status.total_chunks, 0);
    assert!(status.papers_by_status.is_empty());
    assert!(status.vector_store_healthy);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreadable_pdf_marks_paper_failed() {
    let mut h = harness().await;

    let feed = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <summary>The dominant sequence transduction models</summary>
    <author><name>Ashish Vaswani</name></author>
    <link title="pdf" href="{}/pdf/1706.03762v7" rel="related" type="application/pdf"/>
  </entry>
</feed>"#,
        h.server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(feed))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pdf/1706.03762v7"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"definitely not a pdf".to_vec()))
        .mount(&h.server)
        .await;

    let result = h.ingestor.ingest("1706.03762").await;
    assert!(result.is_err());

    let paper = h
        .ingestor
        .database()
        .get_paper("1706.03762")
        .await
        .expect("lookup")
        .expect("paper should be registered");
    assert_eq!(paper.status, PaperStatus::Failed);
    assert!(paper.error_message.is_some());
    assert_eq!(paper.title, "Attention Is All You Need");
}

#[tokio::test(flavor = "multi_thread")]
async fn embedding_width_change_flags_other_papers() {
    let mut h = harness().await;
    mount_embeddings(&h.server).await;

    let bert = PaperMetadata {
        arxiv_id: "1810.04805".to_string(),
        title: "BERT".to_string(),
        pdf_url: "https://arxiv.org/pdf/1810.04805".to_string(),
        ..metadata()
    };
    for paper in [metadata(), bert.clone()] {
        h.ingestor
            .database()
            .register_paper(NewPaper::from(&paper))
            .await
            .expect("register");
    }

    h.ingestor
        .store_pages(&metadata(), &pages())
        .await
        .expect("ingest at the original width");

    h.server.reset().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[0.0, 1.0, 0.0, 0.0, 0.0, 0.0]]
        })))
        .mount(&h.server)
        .await;

    h.ingestor
        .store_pages(&bert, &pages())
        .await
        .expect("ingest at a new width");
    assert_eq!(h.ingestor.vector_store().vector_dimension(), 6);

    let attention = h
        .ingestor
        .database()
        .get_paper("1706.03762")
        .await
        .expect("lookup")
        .expect("paper should exist");
    assert_eq!(attention.status, PaperStatus::Failed);
    assert_eq!(attention.chunk_count, 0);
    assert!(
        attention
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("re-ingest"))
    );

    let bert_row = h
        .ingestor
        .database()
        .get_paper("1810.04805")
        .await
        .expect("lookup")
        .expect("paper should exist");
    assert_eq!(bert_row.status, PaperStatus::Completed);
    assert_eq!(bert_row.chunk_count, 4);

    let result = h.ingestor.search("1706.03762", "attention", 3).await;
    assert!(matches!(result, Err(PaperError::NotFound(_))));
}

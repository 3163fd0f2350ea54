use super::*;
use crate::embeddings::tokenizer::{CharTokenizer, Cl100kTokenizer};

const FILLER: &str = "lorem ipsum dolor sit amet ";

fn page(page_number: usize, text: impl Into<String>) -> PageText {
    PageText {
        page_number,
        text: text.into(),
    }
}

/// ASCII text without whitespace or section keywords
fn plain_text(len: usize) -> String {
    "abcdefghij".repeat(len / 10 + 1).chars().take(len).collect()
}

fn filler(min_len: usize) -> String {
    FILLER.repeat(min_len / FILLER.len() + 1)
}

#[test]
fn detect_section_priority_order() {
    assert_eq!(detect_section("Abstract\nWe study transformers."), Section::Abstract);
    assert_eq!(detect_section("1 Introduction\nDeep nets..."), Section::Introduction);
    assert_eq!(detect_section("Background on attention"), Section::RelatedWork);
    assert_eq!(detect_section("Our approach uses"), Section::Methodology);
    assert_eq!(detect_section("Experimental setup"), Section::Experiments);
    assert_eq!(detect_section("Key findings"), Section::Results);
    assert_eq!(detect_section("Further analysis"), Section::Discussion);
    assert_eq!(detect_section("Concluding remarks"), Section::Conclusion);
    assert_eq!(detect_section("Bibliography"), Section::References);
    assert_eq!(detect_section("lorem ipsum"), Section::Content);
}

#[test]
fn detect_section_is_case_insensitive() {
    assert_eq!(detect_section("ABSTRACT of this paper"), Section::Abstract);
    assert_eq!(detect_section("abstract of this paper"), Section::Abstract);
}

#[test]
fn detect_section_prefers_earlier_category() {
    let text = "Introduction follows the abstract below";
    assert_eq!(detect_section(text), Section::Abstract);
}

#[test]
fn detect_section_only_scans_leading_characters() {
    let base = filler(SECTION_SCAN_CHARS);
    assert!(base.chars().count() >= SECTION_SCAN_CHARS);
    assert_eq!(detect_section(&base), Section::Content);

    let with_late_keyword = format!("{}abstract", base);
    assert_eq!(detect_section(&with_late_keyword), Section::Content);
}

#[test]
fn detect_section_related_work_beats_late_introduction() {
    let text = format!("2. Related Work\n{}introduction", filler(SECTION_SCAN_CHARS));
    assert_eq!(detect_section(&text), Section::RelatedWork);
}

#[test]
fn detect_section_empty_text() {
    assert_eq!(detect_section(""), Section::Content);
    assert_eq!(detect_section("   \n\t"), Section::Content);
}

#[test]
fn section_labels() {
    assert_eq!(Section::RelatedWork.to_string(), "related_work");
    assert_eq!(
        serde_json::to_string(&Section::RelatedWork).expect("should serialize section"),
        "\"related_work\""
    );
    assert_eq!(
        "methodology".parse::<Section>().expect("should parse label"),
        Section::Methodology
    );
    assert_eq!(
        "content".parse::<Section>().expect("should parse fallback label"),
        Section::Content
    );
    assert!("methods".parse::<Section>().is_err());
}

#[test]
fn short_page_without_keyword_is_dropped() {
    let text = plain_text(50);
    assert_eq!(detect_section(&text), Section::Content);

    let chunks = chunk_paper(
        &[page(1, text)],
        "1706.03762",
        &ChunkingConfig::default(),
        &CharTokenizer,
    )
    .expect("chunk_paper should succeed");

    assert!(chunks.is_empty());
}

#[test]
fn sliding_window_positions() {
    let text = plain_text(2500);
    let chunks = chunk_paper(
        &[page(1, text.clone())],
        "1706.03762",
        &ChunkingConfig::default(),
        &CharTokenizer,
    )
    .expect("chunk_paper should succeed");

    // Windows start at 0, 800, 1600 and 2400; the last one is 100 tokens wide
    let lengths: Vec<usize> = chunks.iter().map(|c| c.content.len()).collect();
    assert_eq!(lengths, vec![1000, 1000, 900, 100]);
    assert_eq!(chunks[1].content, text[800..1800]);
    assert_eq!(chunks[3].content, text[2400..]);
}

#[test]
fn short_trailing_window_is_dropped() {
    let chunks = chunk_paper(
        &[page(1, plain_text(2450))],
        "1706.03762",
        &ChunkingConfig::default(),
        &CharTokenizer,
    )
    .expect("chunk_paper should succeed");

    // The fourth window only holds 50 characters
    let lengths: Vec<usize> = chunks.iter().map(|c| c.content.len()).collect();
    assert_eq!(lengths, vec![1000, 1000, 850]);
}

#[test]
fn consecutive_windows_overlap() {
    let config = ChunkingConfig::default();
    let tokenizer = CharTokenizer;
    let chunks = chunk_paper(
        &[page(1, filler(3000))],
        "1706.03762",
        &config,
        &tokenizer,
    )
    .expect("chunk_paper should succeed");
    assert!(chunks.len() >= 3);

    for pair in chunks.windows(2) {
        let earlier = tokenizer.encode(&pair[0].content).expect("encode");
        let later = tokenizer.encode(&pair[1].content).expect("encode");
        if earlier.len() < config.chunk_size {
            continue;
        }

        let tail = &earlier[earlier.len() - config.overlap..];
        let head = &later[..config.overlap.min(later.len())];
        assert_eq!(tail, head);
    }
}

#[test]
fn chunk_indexes_are_contiguous_across_pages() {
    let pages = vec![
        page(1, format!("Abstract {}", filler(1500))),
        page(2, String::new()),
        page(3, format!("1. Introduction {}", filler(900))),
        page(4, plain_text(30)),
        page(5, format!("References {}", filler(2200))),
    ];

    let chunks = chunk_paper(
        &pages,
        "2301.00001",
        &ChunkingConfig::default(),
        &CharTokenizer,
    )
    .expect("chunk_paper should succeed");

    assert!(!chunks.is_empty());
    for (expected, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, expected);
        assert_eq!(chunk.chunk_id, format!("2301.00001_chunk_{}", expected));
        assert_eq!(chunk.paper_id, "2301.00001");
    }

    assert!(chunks.iter().all(|c| c.page_number != 2 && c.page_number != 4));
    assert!(
        chunks
            .windows(2)
            .all(|pair| pair[0].page_number <= pair[1].page_number)
    );

    let first_intro = chunks
        .iter()
        .find(|c| c.page_number == 3)
        .expect("page 3 should produce chunks");
    assert_eq!(first_intro.section, Section::Introduction);
    assert!(
        chunks
            .iter()
            .filter(|c| c.page_number == 5)
            .all(|c| c.section == Section::References)
    );
}

#[test]
fn chunks_respect_size_and_threshold() {
    let config = ChunkingConfig {
        chunk_size: 300,
        overlap: 50,
        min_content_length: 120,
        ..ChunkingConfig::default()
    };
    let tokenizer = CharTokenizer;
    let chunks = chunk_paper(
        &[page(1, filler(1234)), page(2, filler(777))],
        "1810.04805",
        &config,
        &tokenizer,
    )
    .expect("chunk_paper should succeed");

    for chunk in &chunks {
        let tokens = tokenizer.encode(&chunk.content).expect("encode");
        assert!(tokens.len() <= config.chunk_size);
        assert!(chunk.content.trim().chars().count() >= config.min_content_length);
    }
}

#[test]
fn overlap_not_smaller_than_chunk_size_fails() {
    let config = ChunkingConfig {
        chunk_size: 200,
        overlap: 200,
        ..ChunkingConfig::default()
    };

    let result = chunk_paper(&[], "1706.03762", &config, &CharTokenizer);
    assert!(matches!(
        result,
        Err(PaperError::Config(ConfigError::OverlapTooLarge(200, 200)))
    ));

    let config = ChunkingConfig {
        chunk_size: 0,
        overlap: 0,
        ..ChunkingConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn non_ascii_chunks_stay_within_window() {
    let text = "Schrödinger’s equation ∇²ψ = λψ holds for α ∈ ℝ; Erdős–Rényi graphs. ".repeat(60);
    let configs = [
        ChunkingConfig::default(),
        ChunkingConfig {
            chunk_size: 64,
            overlap: 16,
            min_content_length: 10,
            ..ChunkingConfig::default()
        },
    ];
    let cl100k = Cl100kTokenizer::new().expect("cl100k_base should load");
    let tokenizers: [&dyn Tokenizer; 2] = [&CharTokenizer, &cl100k];

    for config in &configs {
        for tokenizer in tokenizers {
            let chunks = chunk_paper(&[page(1, text.clone())], "1706.03762", config, tokenizer)
                .expect("chunk_paper should succeed");
            assert!(chunks.len() >= 2);

            for chunk in &chunks {
                let retokenized = tokenizer.encode(&chunk.content).expect("encode");
                assert!(
                    retokenized.len() <= config.chunk_size,
                    "chunk {} retokenized to {} tokens",
                    chunk.chunk_index,
                    retokenized.len()
                );
                assert!(!chunk.content.contains('\u{FFFD}'));
                assert!(text.contains(&chunk.content));
            }
        }
    }
}

#[test]
fn cl100k_windows_count_subword_tokens() {
    let tokenizer = Cl100kTokenizer::new().expect("cl100k_base should load");
    let config = ChunkingConfig::default();
    let text = filler(8000);

    let by_char = chunk_paper(&[page(1, text.clone())], "1706.03762", &config, &CharTokenizer)
        .expect("chunk_paper should succeed");
    let by_subword = chunk_paper(&[page(1, text)], "1706.03762", &config, &tokenizer)
        .expect("chunk_paper should succeed");

    assert!(by_subword.len() < by_char.len());
    assert!(by_subword[0].content.len() > config.chunk_size);
}

#[test]
fn empty_paper() {
    let chunks = chunk_paper(
        &[page(1, ""), page(2, "   ")],
        "1706.03762",
        &ChunkingConfig::default(),
        &CharTokenizer,
    )
    .expect("chunk_paper should succeed");
    assert!(chunks.is_empty());
}

#[test]
fn default_config_values() {
    let config = ChunkingConfig::default();
    assert_eq!(config.chunk_size, 1000);
    assert_eq!(config.overlap, 200);
    assert_eq!(config.min_content_length, 100);
    assert_eq!(config.step().expect("default config is valid"), 800);
}

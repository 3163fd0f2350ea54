
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use chrono::DateTime;
use fancy_regex::Regex;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::config::{ArxivConfig, Config};
use crate::http::{build_agent, request_with_retry};
use crate::{PaperError, Result};

/// Identifying metadata of an arXiv paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    /// `YYYY-MM-DD`
    pub published_date: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub pdf_url: String,
}

static ID_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"arxiv\.org/abs/(\d+\.\d+)").expect("valid regex"),
        Regex::new(r"arxiv\.org/pdf/(\d+\.\d+)").expect("valid regex"),
        Regex::new(r"^(\d+\.\d+)(?:v\d*)?$").expect("valid regex"),
    ]
});

static BARE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").expect("valid regex"));

/// Extract the canonical `\d+\.\d+` identifier from an id or arXiv URL.
///
/// Version suffixes are dropped. Input that matches no known form is
/// returned trimmed.
#[inline]
pub fn extract_arxiv_id(input: &str) -> String {
    let input = input.trim();

    ID_PATTERNS
        .iter()
        .find_map(|pattern| match pattern.captures(input) {
            Ok(Some(captures)) => captures.get(1).map(|m| m.as_str().to_string()),
            _ => None,
        })
        .unwrap_or_else(|| input.to_string())
}

/// Whether the input names a paper rather than being a free-text question
#[inline]
pub fn is_arxiv_or_url(input: &str) -> bool {
    let input = input.trim();

    if input.contains("arxiv.org/abs/") || input.contains("arxiv.org/pdf/") {
        return true;
    }

    BARE_ID_REGEX.is_match(input).unwrap_or(false)
}

#[inline]
pub fn arxiv_pdf_url(arxiv_id: &str) -> String {
    format!("https://arxiv.org/pdf/{}", arxiv_id)
}

/// Blocking client for the arXiv Atom API and PDF downloads
#[derive(Debug, Clone)]
pub struct ArxivClient {
    api_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
    max_pdf_bytes: u64,
}

impl ArxivClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        Self::from_arxiv_config(&config.arxiv)
    }

    #[inline]
    pub fn from_arxiv_config(config: &ArxivConfig) -> Result<Self> {
        let api_url = config.api_url()?;

        Ok(Self {
            api_url,
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts,
            max_pdf_bytes: config.max_pdf_bytes,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Fetch metadata for an id or arXiv URL
    #[inline]
    pub fn fetch_metadata(&self, input: &str) -> Result<PaperMetadata> {
        let arxiv_id = extract_arxiv_id(input);
        debug!("Fetching arXiv metadata for {}", arxiv_id);

        let mut url = self
            .api_url
            .join("/api/query")
            .context("Failed to build arXiv query URL")?;
        url.query_pairs_mut().append_pair("id_list", &arxiv_id);

        let body = request_with_retry(url.as_str(), self.retry_attempts, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .with_context(|| format!("Failed to query arXiv for {}", arxiv_id))?;

        let metadata = parse_atom_entry(&body, &arxiv_id)?;
        info!("Fetched metadata for {}: {}", metadata.arxiv_id, metadata.title);
        Ok(metadata)
    }

    /// Download a PDF into memory
    #[inline]
    pub fn download_pdf(&self, pdf_url: &str) -> Result<Vec<u8>> {
        debug!("Downloading PDF from {}", pdf_url);

        let bytes = request_with_retry(pdf_url, self.retry_attempts, || {
            self.agent.get(pdf_url).call().and_then(|mut resp| {
                resp.body_mut()
                    .with_config()
                    .limit(self.max_pdf_bytes)
                    .read_to_vec()
            })
        })
        .with_context(|| format!("Failed to download PDF from {}", pdf_url))?;

        info!("Downloaded {} bytes from {}", bytes.len(), pdf_url);
        Ok(bytes)
    }
}

#[derive(Debug, Default)]
struct AtomEntry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

/// Parse the first `<entry>` of an arXiv Atom response
#[inline]
pub fn parse_atom_entry(body: &str, arxiv_id: &str) -> Result<PaperMetadata> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entry: Option<AtomEntry> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if local_name(&e) == "entry" {
                    entry = Some(AtomEntry::default());
                } else if let Some(entry) = entry.as_mut() {
                    read_link(&e, entry)?;
                }
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = entry.as_mut() {
                    read_link(&e, entry)?;
                }
            }
            Ok(Event::Text(t)) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| PaperError::Arxiv(format!("Invalid text in Atom feed: {}", e)))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(t)) => text.push_str(&String::from_utf8_lossy(&t)),
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if let Some(current) = entry.as_mut() {
                    let value = std::mem::take(&mut text);
                    match name.as_str() {
                        "id" => current.id = value,
                        "title" => current.title = value,
                        "summary" => current.summary = value,
                        "published" => current.published = value,
                        "name" => current.authors.push(normalize_whitespace(&value)),
                        "entry" => break,
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(PaperError::Arxiv(format!(
                    "Malformed Atom feed at position {}: {}",
                    reader.error_position(),
                    e
                )));
            }
            Ok(_) => {}
        }
    }

    let entry = entry
        .filter(|e| !e.id.contains("/api/errors") && !e.title.trim().is_empty())
        .ok_or_else(|| PaperError::NotFound(format!("arXiv paper {}", arxiv_id)))?;

    let published_date = DateTime::parse_from_rfc3339(entry.published.trim()).map_or_else(
        |_| entry.published.trim().to_string(),
        |date| date.format("%Y-%m-%d").to_string(),
    );

    Ok(PaperMetadata {
        arxiv_id: arxiv_id.to_string(),
        title: normalize_whitespace(&entry.title),
        authors: entry.authors,
        published_date,
        abstract_text: normalize_whitespace(&entry.summary),
        pdf_url: entry.pdf_url.unwrap_or_else(|| arxiv_pdf_url(arxiv_id)),
    })
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Record the PDF link of an entry
fn read_link(e: &BytesStart<'_>, entry: &mut AtomEntry) -> Result<()> {
    if local_name(e) != "link" {
        return Ok(());
    }

    let mut href = None;
    let mut is_pdf = false;

    for attribute in e.attributes().flatten() {
        let value = attribute
            .unescape_value()
            .map_err(|e| PaperError::Arxiv(format!("Invalid link attribute: {}", e)))?;
        match attribute.key.local_name().as_ref() {
            b"href" => href = Some(value.into_owned()),
            b"type" if value == "application/pdf" => is_pdf = true,
            b"title" if value == "pdf" => is_pdf = true,
            _ => {}
        }
    }

    if is_pdf && entry.pdf_url.is_none() {
        entry.pdf_url = href;
    }

    Ok(())
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

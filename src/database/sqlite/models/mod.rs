
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::arxiv::PaperMetadata;

/// Registry row for one ingested (or attempted) paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Paper {
    pub arxiv_id: String,
    pub title: String,
    /// JSON array of author names
    pub authors: String,
    pub published_date: String,
    pub abstract_text: String,
    pub pdf_url: String,
    pub status: PaperStatus,
    pub page_count: i64,
    pub chunk_count: i64,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
    pub ingested_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaperStatus {
    Pending,
    Ingesting,
    Completed,
    Failed,
}

impl PaperStatus {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            PaperStatus::Pending => "pending",
            PaperStatus::Ingesting => "ingesting",
            PaperStatus::Completed => "completed",
            PaperStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaperStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            PaperStatus::Pending => write!(f, "Pending"),
            PaperStatus::Ingesting => write!(f, "Ingesting"),
            PaperStatus::Completed => write!(f, "Completed"),
            PaperStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPaper {
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub published_date: String,
    pub abstract_text: String,
    pub pdf_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaperUpdate {
    pub status: Option<PaperStatus>,
    pub page_count: Option<i64>,
    pub chunk_count: Option<i64>,
    pub error_message: Option<String>,
    pub ingested_date: Option<NaiveDateTime>,
}

impl From<&PaperMetadata> for NewPaper {
    #[inline]
    fn from(metadata: &PaperMetadata) -> Self {
        Self {
            arxiv_id: metadata.arxiv_id.clone(),
            title: metadata.title.clone(),
            authors: metadata.authors.clone(),
            published_date: metadata.published_date.clone(),
            abstract_text: metadata.abstract_text.clone(),
            pdf_url: metadata.pdf_url.clone(),
        }
    }
}

impl Paper {
    /// Decoded author list; a malformed column yields no authors
    #[inline]
    pub fn author_list(&self) -> Vec<String> {
        serde_json::from_str(&self.authors).unwrap_or_default()
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == PaperStatus::Completed
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == PaperStatus::Failed
    }
}


use anyhow::{Context, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::models::{NewPaper, Paper, PaperStatus, PaperUpdate};

const PAPER_COLUMNS: &str = "arxiv_id, title, authors, published_date, abstract_text, pdf_url, \
     status, page_count, chunk_count, error_message, created_date, ingested_date";

pub struct PaperQueries;

impl PaperQueries {
    /// Insert a paper, or refresh its metadata and reset it to `pending`
    /// when it is already registered
    #[inline]
    pub async fn upsert(pool: &SqlitePool, new_paper: NewPaper) -> Result<Paper> {
        let authors =
            serde_json::to_string(&new_paper.authors).context("Failed to encode author list")?;

        sqlx::query(
            r#"
            INSERT INTO papers (arxiv_id, title, authors, published_date, abstract_text, pdf_url)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(arxiv_id) DO UPDATE SET
                title = excluded.title,
                authors = excluded.authors,
                published_date = excluded.published_date,
                abstract_text = excluded.abstract_text,
                pdf_url = excluded.pdf_url,
                status = 'pending',
                page_count = 0,
                chunk_count = 0,
                error_message = NULL,
                ingested_date = NULL
            "#,
        )
        .bind(&new_paper.arxiv_id)
        .bind(&new_paper.title)
        .bind(authors)
        .bind(&new_paper.published_date)
        .bind(&new_paper.abstract_text)
        .bind(&new_paper.pdf_url)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to register paper {}", new_paper.arxiv_id))?;

        Self::get_by_id(pool, &new_paper.arxiv_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Paper {} vanished after insert", new_paper.arxiv_id))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, arxiv_id: &str) -> Result<Option<Paper>> {
        let query = format!("SELECT {PAPER_COLUMNS} FROM papers WHERE arxiv_id = ?");
        let paper = sqlx::query_as::<_, Paper>(&query)
            .bind(arxiv_id)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("Failed to get paper {}", arxiv_id))?;

        Ok(paper)
    }

    /// All papers, most recently registered first
    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Paper>> {
        let query =
            format!("SELECT {PAPER_COLUMNS} FROM papers ORDER BY created_date DESC, arxiv_id");
        let papers = sqlx::query_as::<_, Paper>(&query)
            .fetch_all(pool)
            .await
            .context("Failed to list papers")?;

        Ok(papers)
    }

    #[inline]
    pub async fn list_by_status(pool: &SqlitePool, status: PaperStatus) -> Result<Vec<Paper>> {
        let query = format!(
            "SELECT {PAPER_COLUMNS} FROM papers WHERE status = ? ORDER BY created_date DESC, arxiv_id"
        );
        let papers = sqlx::query_as::<_, Paper>(&query)
            .bind(status)
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to list {} papers", status.as_str()))?;

        Ok(papers)
    }

    /// Apply the set fields of `update`; returns the row afterwards
    #[inline]
    pub async fn update(
        pool: &SqlitePool,
        arxiv_id: &str,
        update: PaperUpdate,
    ) -> Result<Option<Paper>> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE papers SET ");
        let mut fields = builder.separated(", ");
        let mut any = false;

        if let Some(status) = update.status {
            fields.push("status = ").push_bind_unseparated(status);
            any = true;
        }
        if let Some(page_count) = update.page_count {
            fields.push("page_count = ").push_bind_unseparated(page_count);
            any = true;
        }
        if let Some(chunk_count) = update.chunk_count {
            fields.push("chunk_count = ").push_bind_unseparated(chunk_count);
            any = true;
        }
        if let Some(error_message) = update.error_message {
            fields
                .push("error_message = ")
                .push_bind_unseparated(error_message);
            any = true;
        }
        if let Some(ingested_date) = update.ingested_date {
            fields
                .push("ingested_date = ")
                .push_bind_unseparated(ingested_date);
            any = true;
        }

        if !any {
            return Self::get_by_id(pool, arxiv_id).await;
        }

        builder.push(" WHERE arxiv_id = ").push_bind(arxiv_id);
        builder
            .build()
            .execute(pool)
            .await
            .with_context(|| format!("Failed to update paper {}", arxiv_id))?;

        Self::get_by_id(pool, arxiv_id).await
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, arxiv_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM papers WHERE arxiv_id = ?")
            .bind(arxiv_id)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to delete paper {}", arxiv_id))?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark every completed paper except `keep_id` as failed with no chunks
    #[inline]
    pub async fn fail_completed_except(
        pool: &SqlitePool,
        keep_id: &str,
        error_message: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE papers
            SET status = ?, chunk_count = 0, error_message = ?
            WHERE status = ? AND arxiv_id != ?
            "#,
        )
        .bind(PaperStatus::Failed)
        .bind(error_message)
        .bind(PaperStatus::Completed)
        .bind(keep_id)
        .execute(pool)
        .await
        .context("Failed to invalidate completed papers")?;

        Ok(result.rows_affected())
    }

    /// Number of papers per status, statuses with no papers omitted
    #[inline]
    pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(PaperStatus, i64)>> {
        let counts = sqlx::query_as::<_, (PaperStatus, i64)>(
            "SELECT status, COUNT(*) FROM papers GROUP BY status ORDER BY status",
        )
        .fetch_all(pool)
        .await
        .context("Failed to count papers by status")?;

        Ok(counts)
    }
}

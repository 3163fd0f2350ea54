use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info, warn};


pub mod models;
pub mod queries;

pub use models::{NewPaper, Paper, PaperStatus, PaperUpdate};
pub use queries::PaperQueries;

use crate::config::Config;

pub type DbPool = Pool<Sqlite>;

/// Paper registry backed by SQLite
#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    /// Open the registry file inside the configuration directory
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let config_dir = config.get_base_dir();
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config.database_path()).await
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn register_paper(&self, paper: NewPaper) -> Result<Paper> {
        PaperQueries::upsert(&self.pool, paper).await
    }

    #[inline]
    pub async fn get_paper(&self, arxiv_id: &str) -> Result<Option<Paper>> {
        PaperQueries::get_by_id(&self.pool, arxiv_id).await
    }

    #[inline]
    pub async fn list_papers(&self) -> Result<Vec<Paper>> {
        PaperQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn update_paper(&self, arxiv_id: &str, update: PaperUpdate) -> Result<Option<Paper>> {
        PaperQueries::update(&self.pool, arxiv_id, update).await
    }

    #[inline]
    pub async fn mark_ingesting(&self, arxiv_id: &str) -> Result<Option<Paper>> {
        self.update_paper(
            arxiv_id,
            PaperUpdate {
                status: Some(PaperStatus::Ingesting),
                ..PaperUpdate::default()
            },
        )
        .await
    }

    #[inline]
    pub async fn mark_completed(
        &self,
        arxiv_id: &str,
        page_count: i64,
        chunk_count: i64,
    ) -> Result<Option<Paper>> {
        self.update_paper(
            arxiv_id,
            PaperUpdate {
                status: Some(PaperStatus::Completed),
                page_count: Some(page_count),
                chunk_count: Some(chunk_count),
                ingested_date: Some(Utc::now().naive_utc()),
                ..PaperUpdate::default()
            },
        )
        .await
    }

    #[inline]
    pub async fn mark_failed(&self, arxiv_id: &str, error_message: &str) -> Result<Option<Paper>> {
        self.update_paper(
            arxiv_id,
            PaperUpdate {
                status: Some(PaperStatus::Failed),
                error_message: Some(error_message.to_string()),
                ..PaperUpdate::default()
            },
        )
        .await
    }

    /// Flag completed papers other than `keep_id` whose chunks are gone
    #[inline]
    pub async fn invalidate_other_papers(&self, keep_id: &str, reason: &str) -> Result<u64> {
        let affected = PaperQueries::fail_completed_except(&self.pool, keep_id, reason).await?;
        if affected > 0 {
            warn!("Marked {} papers for re-ingestion: {}", affected, reason);
        }
        Ok(affected)
    }

    #[inline]
    pub async fn delete_paper(&self, arxiv_id: &str) -> Result<bool> {
        PaperQueries::delete(&self.pool, arxiv_id).await
    }

    #[inline]
    pub async fn count_by_status(&self) -> Result<Vec<(PaperStatus, i64)>> {
        PaperQueries::count_by_status(&self.pool).await
    }
}

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::{PgConnectOptions, PgPoolOptions}, PgPool};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{config::Config, models::{ImageRecord, NewImage}};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INSERT_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_IMAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    filename TEXT NOT NULL,
    url TEXT NOT NULL,
    width INTEGER,
    height INTEGER,
    created_at TIMESTAMPTZ NOT NULL
)
"#;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("images collection is not initialized")]
    NotInitialized,

    #[error("metadata insert timed out")]
    Timeout,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Index of stored images. Records are only ever inserted.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Stamps `created_at`, inserts the record and returns the store-assigned id.
    async fn insert(&self, image: NewImage) -> Result<Uuid, MetadataError>;
}

/// Initialize and return a PostgreSQL connection pool with the `images` table in place.
pub async fn init_db(config: &Config) -> Result<PgPool, sqlx::Error> {
    info!("Connecting to database...");

    let mut options = PgConnectOptions::from_str(&config.database_url)?;
    if let Some(name) = &config.database_name {
        options = options.database(name);
    }

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect_with(options)
        .await?;

    sqlx::query(CREATE_IMAGES_TABLE).execute(&pool).await?;

    info!("Database connection established");
    Ok(pool)
}

#[derive(Clone)]
pub struct PgMetadataStore {
    pool: Option<PgPool>,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    /// A store whose pool was never established; every insert fails.
    pub fn disconnected() -> Self {
        Self { pool: None }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn insert(&self, image: NewImage) -> Result<Uuid, MetadataError> {
        let pool = self.pool.as_ref().ok_or(MetadataError::NotInitialized)?;

        let insert = sqlx::query_as::<_, ImageRecord>(
            r#"
            INSERT INTO images (filename, url, width, height, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, filename, url, width, height, created_at
            "#,
        )
        .bind(&image.filename)
        .bind(&image.url)
        .bind(image.width)
        .bind(image.height)
        .bind(Utc::now())
        .fetch_one(pool);

        let record = tokio::time::timeout(INSERT_TIMEOUT, insert)
            .await
            .map_err(|_| MetadataError::Timeout)??;

        info!("Image metadata saved: {} ({}, created {})", record.id, record.filename, record.created_at);
        Ok(record.id)
    }
}

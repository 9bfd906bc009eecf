//! Shared application context.
//!
//! One [`AppContext`] is constructed per process and passed to every
//! pipeline call: configuration, the index pool, and the embedding provider.
//! Construction also enforces the startup precondition that the generation
//! backend's credential exists — a missing key fails here, before any
//! operation begins.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::llm;

pub struct AppContext {
    pub config: Config,
    pub pool: SqlitePool,
    pub embedder: Box<dyn EmbeddingProvider>,
}

impl AppContext {
    pub async fn new(config: Config) -> Result<Self> {
        llm::check_credentials(&config.llm)?;
        let embedder = embedding::create_provider(&config.embedding)?;
        let pool = db::connect(&config.db.path).await?;

        Ok(Self {
            config,
            pool,
            embedder,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

//! Watermark persistence.
//!
//! - `repo`: SQL-only functions over the `watermarks` table.
//! - [`WatermarkStore`]: the seam the pipeline reads and writes through.

use anyhow::Result;
use async_trait::async_trait;

pub mod repo;

pub use repo::*;

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn get(&self, course_id: &str) -> Result<Option<i64>>;
    async fn put(&self, course_id: &str, nr: i64) -> Result<()>;
}

/// SQLite-backed store; reads see prior writes on the same pool.
#[derive(Debug, Clone)]
pub struct SqliteWatermarkStore {
    pool: Pool,
}

impl SqliteWatermarkStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn get(&self, course_id: &str) -> Result<Option<i64>> {
        get_watermark(&self.pool, course_id).await
    }

    async fn put(&self, course_id: &str, nr: i64) -> Result<()> {
        put_watermark(&self.pool, course_id, nr).await
    }
}

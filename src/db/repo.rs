use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

/// Open the watermark database in WAL mode with full sync. File databases
/// are created along with their parent directory; `sqlite://~/…` is resolved
/// against `$HOME`.
pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let options = SqliteConnectOptions::from_str(&expand_home(database_url))
        .with_context(|| format!("invalid database URL {database_url}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);

    if let Some(dir) = options.clone().get_filename().parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
    }

    SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .context("failed to open watermark database")
}

fn expand_home(database_url: &str) -> String {
    match (database_url.strip_prefix("sqlite://~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("sqlite://{}/{}", home.trim_end_matches('/'), rest),
        _ => database_url.to_string(),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all, fields(course_id = %course_id))]
pub async fn get_watermark(pool: &Pool, course_id: &str) -> Result<Option<i64>> {
    let nr = sqlx::query_scalar::<_, i64>("SELECT last_nr FROM watermarks WHERE course_id = ?")
        .bind(course_id)
        .fetch_optional(pool)
        .await?;
    Ok(nr)
}

/// Upsert the watermark; a stored value is never lowered.
#[instrument(skip_all, fields(course_id = %course_id, nr = nr))]
pub async fn put_watermark(pool: &Pool, course_id: &str, nr: i64) -> Result<()> {
    sqlx::query(
        "INSERT INTO watermarks (course_id, last_nr, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(course_id) DO UPDATE SET \
         last_nr = MAX(watermarks.last_nr, excluded.last_nr), \
         updated_at = excluded.updated_at",
    )
    .bind(course_id)
    .bind(nr)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn unset_watermark_is_none() {
        let pool = setup_pool().await;
        assert_eq!(get_watermark(&pool, "cs101").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_then_get_round_trips_per_course() {
        let pool = setup_pool().await;
        put_watermark(&pool, "cs101", 11).await.unwrap();
        put_watermark(&pool, "math240", 3).await.unwrap();
        assert_eq!(get_watermark(&pool, "cs101").await.unwrap(), Some(11));
        assert_eq!(get_watermark(&pool, "math240").await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn watermark_never_decreases() {
        let pool = setup_pool().await;
        put_watermark(&pool, "cs101", 20).await.unwrap();
        put_watermark(&pool, "cs101", 15).await.unwrap();
        assert_eq!(get_watermark(&pool, "cs101").await.unwrap(), Some(20));
        put_watermark(&pool, "cs101", 21).await.unwrap();
        assert_eq!(get_watermark(&pool, "cs101").await.unwrap(), Some(21));
    }

    #[tokio::test]
    async fn file_database_is_created_with_parent_dir() {
        let td = tempfile::tempdir().unwrap();
        let file = td.path().join("nested").join("relay.db");
        let pool = init_pool(&format!("sqlite://{}", file.display()))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        put_watermark(&pool, "cs101", 4).await.unwrap();
        assert!(file.exists());
        assert_eq!(get_watermark(&pool, "cs101").await.unwrap(), Some(4));
    }

    #[test]
    fn home_prefix_is_expanded() {
        assert_eq!(expand_home("sqlite::memory:"), "sqlite::memory:");
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(
                expand_home("sqlite://~/relay/relay.db"),
                format!("sqlite://{}/relay/relay.db", home.trim_end_matches('/'))
            );
        }
    }
}

use crate::models::JobRow;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const JOB_COLUMNS: &str =
    "id, payload, status, run_at, claimed_by, claimed_at, error, created_at";

pub async fn push(
    pool: &PgPool,
    payload: &serde_json::Value,
    run_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO crawl_jobs (payload, status, run_at)
        VALUES ($1, 'pending', $2)
        RETURNING id
        "#,
    )
    .bind(payload)
    .bind(run_at)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

/// Claim up to `limit` due jobs for `worker_id`. `FOR UPDATE SKIP LOCKED`
/// keeps concurrent workers from double-claiming a row.
pub async fn claim(
    pool: &PgPool,
    worker_id: &str,
    limit: i64,
) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE crawl_jobs
        SET status = 'running',
            claimed_by = $1,
            claimed_at = now()
        WHERE id IN (
            SELECT id FROM crawl_jobs
            WHERE status = 'pending' AND run_at <= now()
            ORDER BY run_at
            LIMIT $2
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(worker_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn complete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM crawl_jobs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Permanent failure: the row stays behind with the error text so an
/// operator can see what was dropped.
pub async fn fail(pool: &PgPool, id: i64, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE crawl_jobs
        SET status = 'failed', error = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

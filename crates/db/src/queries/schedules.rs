use crate::models::ScheduleRow;
use sqlx::PgPool;
use trawler_core::types::Channel;

const SCHEDULE_COLUMNS: &str = r#"channel_id, access_hash, refresh_interval, "offset", pts,
       running, error, title, username, participants_count, about,
       next_run_at, created_at, updated_at"#;

pub async fn get(pool: &PgPool, channel_id: i64) -> Result<Option<ScheduleRow>, sqlx::Error> {
    sqlx::query_as::<_, ScheduleRow>(&format!(
        r#"
        SELECT {SCHEDULE_COLUMNS}
        FROM channel_schedules
        WHERE channel_id = $1
        "#
    ))
    .bind(channel_id)
    .fetch_optional(pool)
    .await
}

pub async fn create(
    pool: &PgPool,
    channel_id: i64,
    access_hash: Option<i64>,
    refresh_interval: i64,
) -> Result<ScheduleRow, sqlx::Error> {
    sqlx::query_as::<_, ScheduleRow>(&format!(
        r#"
        INSERT INTO channel_schedules
            (channel_id, access_hash, refresh_interval, "offset", running, next_run_at)
        VALUES ($1, $2, $3, 1, true, now())
        RETURNING {SCHEDULE_COLUMNS}
        "#
    ))
    .bind(channel_id)
    .bind(access_hash)
    .bind(refresh_interval)
    .fetch_one(pool)
    .await
}

pub async fn resume(
    pool: &PgPool,
    channel_id: i64,
    refresh_interval: i64,
) -> Result<Option<ScheduleRow>, sqlx::Error> {
    sqlx::query_as::<_, ScheduleRow>(&format!(
        r#"
        UPDATE channel_schedules
        SET running = true,
            error = NULL,
            refresh_interval = $2,
            next_run_at = now(),
            updated_at = now()
        WHERE channel_id = $1
        RETURNING {SCHEDULE_COLUMNS}
        "#
    ))
    .bind(channel_id)
    .bind(refresh_interval)
    .fetch_optional(pool)
    .await
}

pub async fn update_metadata(
    pool: &PgPool,
    channel_id: i64,
    channel: &Channel,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE channel_schedules
        SET title = $2,
            username = $3,
            participants_count = $4,
            about = $5,
            updated_at = now()
        WHERE channel_id = $1
        "#,
    )
    .bind(channel_id)
    .bind(channel.title.as_deref())
    .bind(channel.username.as_deref())
    .bind(channel.participants_count)
    .bind(channel.about.as_deref())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_pts(pool: &PgPool, channel_id: i64, pts: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE channel_schedules
        SET pts = GREATEST(COALESCE(pts, 0), $2),
            updated_at = now()
        WHERE channel_id = $1
        "#,
    )
    .bind(channel_id)
    .bind(pts)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Watermark writes go through GREATEST so a late or replayed pass can never
/// move the offset backwards.
pub async fn advance_offset(
    pool: &PgPool,
    channel_id: i64,
    offset: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE channel_schedules
        SET "offset" = GREATEST("offset", $2),
            updated_at = now()
        WHERE channel_id = $1
        "#,
    )
    .bind(channel_id)
    .bind(offset)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn mark_stopped(
    pool: &PgPool,
    channel_id: i64,
    error: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE channel_schedules
        SET running = false,
            error = $2,
            updated_at = now()
        WHERE channel_id = $1
        "#,
    )
    .bind(channel_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Claim due schedules and re-arm their next trigger in one statement.
/// The claiming UPDATE is the single-flight guarantee: a schedule can only
/// be handed to one scheduler tick at a time.
pub async fn claim_due(pool: &PgPool, limit: i64) -> Result<Vec<ScheduleRow>, sqlx::Error> {
    sqlx::query_as::<_, ScheduleRow>(&format!(
        r#"
        UPDATE channel_schedules
        SET next_run_at = now() + make_interval(secs => refresh_interval),
            updated_at = now()
        WHERE channel_id IN (
            SELECT channel_id FROM channel_schedules
            WHERE running AND next_run_at <= now()
            ORDER BY next_run_at
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {SCHEDULE_COLUMNS}
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

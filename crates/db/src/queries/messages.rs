use sqlx::PgPool;
use trawler_core::types::Message;

/// Legacy direct-write path, used only when no broker is configured.
/// Conflicts are skipped: delivery is at-least-once and replays are expected.
pub async fn insert_many(
    pool: &PgPool,
    channel_id: i64,
    messages: &[Message],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for message in messages {
        sqlx::query(
            r#"
            INSERT INTO channel_messages
                (channel_id, message_id, body, posted_at, views, forwards)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (channel_id, message_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(message.id)
        .bind(message.message.as_deref())
        .bind(message.date)
        .bind(message.views)
        .bind(message.forwards)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

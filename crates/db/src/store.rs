//! Port implementations over Postgres: the schedule repository and the
//! crawl-job queue.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use trawler_core::error::CrawlError;
use trawler_core::ports::{JobSink, ScheduleStore};
use trawler_core::types::{Channel, ChannelSchedule, CrawlJob, Message, NewSchedule};

use crate::queries;

fn db_err(err: sqlx::Error) -> CrawlError {
    CrawlError::storage(err)
}

#[derive(Clone)]
pub struct PgScheduleStore {
    pool: PgPool,
}

impl PgScheduleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleStore for PgScheduleStore {
    async fn get(&self, channel_id: i64) -> Result<Option<ChannelSchedule>, CrawlError> {
        let row = queries::schedules::get(&self.pool, channel_id)
            .await
            .map_err(db_err)?;
        Ok(row.map(Into::into))
    }

    async fn create(&self, new: NewSchedule) -> Result<ChannelSchedule, CrawlError> {
        let row = queries::schedules::create(
            &self.pool,
            new.channel_id,
            new.access_hash,
            new.refresh_interval,
        )
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }

    async fn resume(
        &self,
        channel_id: i64,
        refresh_interval: i64,
    ) -> Result<ChannelSchedule, CrawlError> {
        let row = queries::schedules::resume(&self.pool, channel_id, refresh_interval)
            .await
            .map_err(db_err)?;
        row.map(Into::into).ok_or(CrawlError::NotFound(channel_id))
    }

    async fn update_metadata(&self, channel_id: i64, channel: &Channel) -> Result<(), CrawlError> {
        let affected = queries::schedules::update_metadata(&self.pool, channel_id, channel)
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(CrawlError::NotFound(channel_id));
        }
        Ok(())
    }

    async fn update_pts(&self, channel_id: i64, pts: i64) -> Result<(), CrawlError> {
        let affected = queries::schedules::update_pts(&self.pool, channel_id, pts)
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(CrawlError::NotFound(channel_id));
        }
        Ok(())
    }

    async fn advance_offset(&self, channel_id: i64, offset: i64) -> Result<(), CrawlError> {
        let affected = queries::schedules::advance_offset(&self.pool, channel_id, offset)
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(CrawlError::NotFound(channel_id));
        }
        Ok(())
    }

    async fn mark_stopped(&self, channel_id: i64, error: Option<&str>) -> Result<(), CrawlError> {
        let affected = queries::schedules::mark_stopped(&self.pool, channel_id, error)
            .await
            .map_err(db_err)?;
        if affected == 0 {
            return Err(CrawlError::NotFound(channel_id));
        }
        Ok(())
    }

    async fn add_messages(&self, channel_id: i64, messages: &[Message]) -> Result<(), CrawlError> {
        queries::messages::insert_many(&self.pool, channel_id, messages)
            .await
            .map_err(db_err)
    }
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobSink for PgJobQueue {
    async fn submit(&self, job: CrawlJob, delay: Duration) -> Result<(), CrawlError> {
        let payload = serde_json::to_value(&job)
            .map_err(|err| CrawlError::storage(format!("encode job: {err}")))?;
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        queries::jobs::push(&self.pool, &payload, Utc::now() + delay)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

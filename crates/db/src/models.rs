//! Row types. These mirror the tables in `schema.sql` and are mapped into
//! the pure entities in `trawler-core` before they leave this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use trawler_core::types::ChannelSchedule;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleRow {
    pub channel_id: i64,
    pub access_hash: Option<i64>,
    pub refresh_interval: i64,
    pub offset: i64,
    pub pts: Option<i64>,
    pub running: bool,
    pub error: Option<String>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub participants_count: Option<i64>,
    pub about: Option<String>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ScheduleRow> for ChannelSchedule {
    fn from(row: ScheduleRow) -> Self {
        ChannelSchedule {
            channel_id: row.channel_id,
            access_hash: row.access_hash,
            refresh_interval: row.refresh_interval,
            offset: row.offset,
            pts: row.pts,
            running: row.running,
            error: row.error,
            title: row.title,
            username: row.username,
            participants_count: row.participants_count,
            about: row.about,
            next_run_at: row.next_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: i64,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn schedule_row_maps_onto_entity() {
        let now = Utc::now();
        let row = ScheduleRow {
            channel_id: 42,
            access_hash: Some(7),
            refresh_interval: 45,
            offset: 130,
            pts: Some(9),
            running: true,
            error: None,
            title: Some("t".into()),
            username: None,
            participants_count: Some(12_000),
            about: None,
            next_run_at: now,
            created_at: now,
            updated_at: now,
        };

        let schedule: ChannelSchedule = row.into();
        assert_eq!(schedule.channel_id, 42);
        assert_eq!(schedule.offset, 130);
        assert_eq!(schedule.pts, Some(9));
        assert_eq!(schedule.peer().access_hash, Some(7));
    }
}

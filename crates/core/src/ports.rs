//! Collaborator ports. The crawl engine is written against these traits;
//! Postgres, redis, and the HTTP query service plug in behind them, and the
//! test fakes in `trawler-crawler::testing` stand in for them in unit tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CrawlError;
use crate::types::{Channel, ChannelSchedule, CrawlJob, Message, NewSchedule, PeerChannel};

/// Remote data source. Returns raw payloads; normalization happens in the
/// crawler so these calls stay a thin transport.
#[async_trait]
pub trait QueryService: Send + Sync {
    /// "Get full channel": pts plus channel metadata.
    async fn get_full_channel(&self, peer: &PeerChannel) -> Result<Value, CrawlError>;

    /// "Get history": up to `limit` messages older than `offset_id`, newest
    /// first, plus referenced channels and users. `offset_id = 0` starts
    /// from the top of the channel.
    async fn get_history(
        &self,
        peer: &PeerChannel,
        offset_id: i64,
        limit: u32,
    ) -> Result<Value, CrawlError>;
}

/// Persistence for `ChannelSchedule` rows.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn get(&self, channel_id: i64) -> Result<Option<ChannelSchedule>, CrawlError>;

    async fn create(&self, new: NewSchedule) -> Result<ChannelSchedule, CrawlError>;

    /// Flip a stopped schedule back to running with its state intact.
    /// Fails with `NotFound` when no schedule exists.
    async fn resume(
        &self,
        channel_id: i64,
        refresh_interval: i64,
    ) -> Result<ChannelSchedule, CrawlError>;

    async fn update_metadata(&self, channel_id: i64, channel: &Channel) -> Result<(), CrawlError>;

    async fn update_pts(&self, channel_id: i64, pts: i64) -> Result<(), CrawlError>;

    /// Persist a new watermark. Implementations must keep `offset`
    /// monotonically non-decreasing.
    async fn advance_offset(&self, channel_id: i64, offset: i64) -> Result<(), CrawlError>;

    /// `running=false` plus the fatal error text (or `None` on deregistration).
    async fn mark_stopped(&self, channel_id: i64, error: Option<&str>) -> Result<(), CrawlError>;

    /// Legacy direct-write mode only: used when no broker is configured.
    async fn add_messages(&self, channel_id: i64, messages: &[Message]) -> Result<(), CrawlError>;
}

/// Topic-style publish onto a named durable queue.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), CrawlError>;
}

/// Where crawl steps re-submit themselves: the next chain link, a bounded
/// retry, or the unpublished remainder of a publish.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn submit(&self, job: CrawlJob, delay: Duration) -> Result<(), CrawlError>;
}

//! Domain entities and job payloads. Pure data, no I/O types — rows and wire
//! payloads are mapped into these at the adapter boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque reference to a remote channel, passed by value between crawl steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerChannel {
    pub channel_id: i64,
    pub access_hash: Option<i64>,
}

/// Metadata snapshot of a channel, built fresh each pass and compared against
/// the cached fields on the schedule to decide whether to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: i64,
    pub access_hash: Option<i64>,
    pub title: Option<String>,
    pub username: Option<String>,
    pub participants_count: Option<i64>,
    pub about: Option<String>,
}

/// Message or forward origin: a channel or a user, resolved by which id field
/// the raw record carries. Records with neither resolve to `None` at the use
/// site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Peer {
    Channel { channel_id: i64 },
    User { user_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FwdFrom {
    pub date: Option<DateTime<Utc>>,
    pub channel_post: Option<i64>,
    pub from_peer: Option<Peer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic per channel; larger means newer.
    pub id: i64,
    pub message: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub views: Option<i64>,
    pub forwards: Option<i64>,
    pub channel_id: i64,
    pub from_peer: Option<Peer>,
    pub fwd_from: Option<FwdFrom>,
}

/// A user surfaced incidentally while paginating (author or forward origin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub access_hash: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone: Option<String>,
}

/// Durable crawl state for one channel. One row per `channel_id`; `offset`
/// and `pts` only ever move forward once a pass is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSchedule {
    pub channel_id: i64,
    pub access_hash: Option<i64>,
    /// Seconds between metadata syncs.
    pub refresh_interval: i64,
    /// Watermark: id of the newest message fully processed as of the last
    /// completed run. Pagination floor for the next pass.
    pub offset: i64,
    pub pts: Option<i64>,
    pub running: bool,
    pub error: Option<String>,
    // Last-seen metadata, cached purely for change detection.
    pub title: Option<String>,
    pub username: Option<String>,
    pub participants_count: Option<i64>,
    pub about: Option<String>,
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelSchedule {
    pub fn peer(&self) -> PeerChannel {
        PeerChannel {
            channel_id: self.channel_id,
            access_hash: self.access_hash,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchedule {
    pub channel_id: i64,
    pub access_hash: Option<i64>,
    pub refresh_interval: i64,
}

/// Unit of work on the crawl queue. Each variant is independently retryable
/// with the same logical arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrawlJob {
    /// One metadata-sync pass for a channel.
    Refresh { peer: PeerChannel, attempt: u32 },
    /// One link of a backward pagination chain. `end_offset` is the
    /// watermark recorded before the chain began.
    HistoryPage {
        peer: PeerChannel,
        start_offset: i64,
        end_offset: i64,
        attempt: u32,
    },
    /// Unpublished remainder of a resumable publish.
    PublishRetry {
        queue: String,
        items: Vec<serde_json::Value>,
        attempt: u32,
    },
}

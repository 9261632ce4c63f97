//! The crawl/synchronization engine: response normalization, the per-channel
//! incremental-sync pass, backward history pagination, and resumable
//! publication.
//!
//! Everything here runs against the ports in `trawler_core::ports`; the
//! engine never talks to Postgres, redis, or HTTP directly. A given channel
//! is assumed to have at most one in-flight chain at a time — that is
//! enforced by the scheduling layer's single claim of a due schedule, not by
//! a lock in this crate.

use std::sync::Arc;

use trawler_core::config::CrawlConfig;
use trawler_core::ports::{Broker, JobSink, QueryService, ScheduleStore};

pub mod chain;
pub mod channel;
pub mod history;
pub mod legacy;
pub mod normalize;
pub mod publish;
pub mod testing;

/// Everything one crawl step needs, passed in at construction.
#[derive(Clone)]
pub struct CrawlContext {
    pub query: Arc<dyn QueryService>,
    pub store: Arc<dyn ScheduleStore>,
    /// Absent switches the engine into legacy direct-write mode.
    pub broker: Option<Arc<dyn Broker>>,
    pub jobs: Arc<dyn JobSink>,
    pub cfg: CrawlConfig,
}

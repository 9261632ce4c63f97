use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use trawler_core::error::CrawlError;
use trawler_core::ports::Broker;

/// Topic-style broker over redis streams: one stream per entity queue,
/// appended with `XADD`. Connectivity failures surface as `Transient` so the
/// resumable publisher can hand off the unpublished remainder.
#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self, CrawlError> {
        let client = redis::Client::open(url).map_err(CrawlError::transient)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(CrawlError::transient)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), CrawlError> {
        let mut conn = self.conn.clone();
        let _: String = conn
            .xadd(queue, "*", &[("payload", payload)])
            .await
            .map_err(CrawlError::transient)?;
        Ok(())
    }
}

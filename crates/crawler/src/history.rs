//! One backward history page: fetch at the cursor, normalize, drop rows at
//! or below the floor already crawled, and publish (or persist directly when
//! no broker is configured).

use tracing::debug;

use trawler_core::error::CrawlError;
use trawler_core::types::PeerChannel;

use crate::normalize;
use crate::publish::{to_items, Publisher};
use crate::CrawlContext;

/// Fetch the page at `start_offset` and hand its contents on. Returns the
/// next cursor; the caller decides whether the chain continues.
pub async fn fetch_page(
    ctx: &CrawlContext,
    peer: &PeerChannel,
    start_offset: i64,
    end_offset: i64,
) -> Result<Option<i64>, CrawlError> {
    let raw = ctx
        .query
        .get_history(peer, start_offset, ctx.cfg.page_limit)
        .await?;
    let mut page = normalize::history_page(&raw, peer.channel_id)?;

    let fetched = page.messages.len();
    page.messages.retain(|m| m.id >= end_offset);
    debug!(
        channel_id = peer.channel_id,
        start_offset,
        end_offset,
        fetched,
        kept = page.messages.len(),
        next_offset = page.next_offset,
        "fetched history page"
    );

    match &ctx.broker {
        Some(broker) => {
            let publisher = Publisher {
                broker: broker.as_ref(),
                jobs: ctx.jobs.as_ref(),
                retry: &ctx.cfg.page_retry,
            };
            publisher
                .publish_many(&ctx.cfg.messages_queue, to_items(&page.messages)?, 0)
                .await?;
            publisher
                .publish_many(&ctx.cfg.channels_queue, to_items(&page.channels)?, 0)
                .await?;
            publisher
                .publish_many(&ctx.cfg.users_queue, to_items(&page.users)?, 0)
                .await?;
        }
        None => {
            ctx.store
                .add_messages(peer.channel_id, &page.messages)
                .await?;
        }
    }

    Ok(page.next_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{schedule_fixture, MemoryBroker, MemoryJobs, MemoryStore, ScriptedQuery};
    use serde_json::json;
    use std::sync::Arc;
    use trawler_core::config::CrawlConfig;

    const CHANNEL_ID: i64 = 10;

    fn peer() -> PeerChannel {
        PeerChannel {
            channel_id: CHANNEL_ID,
            access_hash: Some(7),
        }
    }

    fn page_json(ids: &[i64]) -> serde_json::Value {
        let messages: Vec<_> = ids
            .iter()
            .map(|id| json!({"id": id, "message": format!("post {id}")}))
            .collect();
        json!({
            "messages": messages,
            "chats": [{"id": 55, "title": "Quoted"}],
            "users": [{"id": 900, "first_name": "Ada"}]
        })
    }

    struct Harness {
        query: Arc<ScriptedQuery>,
        store: Arc<MemoryStore>,
        broker: Arc<MemoryBroker>,
        jobs: Arc<MemoryJobs>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                query: Arc::new(ScriptedQuery::new()),
                store: Arc::new(MemoryStore::with_schedule(schedule_fixture(
                    CHANNEL_ID, 100, None,
                ))),
                broker: Arc::new(MemoryBroker::new()),
                jobs: Arc::new(MemoryJobs::new()),
            }
        }

        fn ctx(&self, with_broker: bool) -> CrawlContext {
            CrawlContext {
                query: self.query.clone(),
                store: self.store.clone(),
                broker: with_broker.then(|| self.broker.clone() as _),
                jobs: self.jobs.clone(),
                cfg: CrawlConfig::for_tests(),
            }
        }
    }

    #[tokio::test]
    async fn publishes_messages_above_the_floor_only() {
        let h = Harness::new();
        h.query.push_history(Ok(page_json(&[130, 120, 99, 95])));

        let next = fetch_page(&h.ctx(true), &peer(), 130, 100).await.unwrap();

        assert_eq!(next, Some(95));
        let sent = h.broker.sent_to("messages");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["id"], 130);
        assert_eq!(sent[1]["id"], 120);
    }

    #[tokio::test]
    async fn referenced_chats_and_users_go_to_their_queues() {
        let h = Harness::new();
        h.query.push_history(Ok(page_json(&[130])));

        fetch_page(&h.ctx(true), &peer(), 130, 100).await.unwrap();

        let channels = h.broker.sent_to("channels");
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0]["channel_id"], 55);
        let users = h.broker.sent_to("users");
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], 900);
    }

    #[tokio::test]
    async fn without_a_broker_messages_are_stored_directly() {
        let h = Harness::new();
        h.query.push_history(Ok(page_json(&[130, 99])));

        fetch_page(&h.ctx(false), &peer(), 130, 100).await.unwrap();

        let written = h.store.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].id, 130);
        assert!(h.broker.sent_to("messages").is_empty());
    }

    #[tokio::test]
    async fn empty_page_yields_no_cursor() {
        let h = Harness::new();
        h.query.push_history(Ok(json!({"messages": []})));

        let next = fetch_page(&h.ctx(true), &peer(), 130, 100).await.unwrap();

        assert_eq!(next, None);
        assert!(h.broker.sent_to("messages").is_empty());
    }

    #[tokio::test]
    async fn transient_query_failure_propagates() {
        let h = Harness::new();
        h.query
            .push_history(Err(CrawlError::transient("gateway timeout")));

        let err = fetch_page(&h.ctx(true), &peer(), 130, 100).await.unwrap_err();
        assert!(err.is_transient());
    }
}

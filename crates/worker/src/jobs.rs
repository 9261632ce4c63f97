//! Job execution and failure classification. Fatal errors stop the channel's
//! schedule; transient errors re-queue the same job with a bounded, jittered
//! delay until the retry ceiling, after which the job row is failed with its
//! payload intact for operator inspection — the schedule keeps running, so
//! the next interval retries naturally.

use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use trawler_core::config::Settings;
use trawler_core::error::CrawlError;
use trawler_core::types::{CrawlJob, PeerChannel};
use trawler_crawler::publish::Publisher;
use trawler_crawler::{chain, channel, history, CrawlContext};
use trawler_db::queries;

pub async fn run_worker(
    pool: PgPool,
    ctx: CrawlContext,
    worker_id: String,
    settings: Settings,
) -> anyhow::Result<()> {
    let poll = Duration::from_millis(settings.poll_interval_ms);
    loop {
        let claimed =
            match queries::jobs::claim(&pool, &worker_id, settings.worker_batch_size).await {
                Ok(rows) => rows,
                Err(err) => {
                    error!(worker_id, error = %err, "claiming jobs failed");
                    tokio::time::sleep(poll).await;
                    continue;
                }
            };

        if claimed.is_empty() {
            tokio::time::sleep(poll).await;
            continue;
        }

        for row in claimed {
            let job: CrawlJob = match serde_json::from_value(row.payload.clone()) {
                Ok(job) => job,
                Err(err) => {
                    error!(job_id = row.id, error = %err, "undecodable job payload");
                    if let Err(err) = queries::jobs::fail(&pool, row.id, &err.to_string()).await {
                        error!(job_id = row.id, error = %err, "recording job failure failed");
                    }
                    continue;
                }
            };

            match execute(&ctx, job).await {
                Ok(()) => {
                    if let Err(err) = queries::jobs::complete(&pool, row.id).await {
                        error!(job_id = row.id, error = %err, "completing job failed");
                    }
                }
                Err(err) => {
                    error!(job_id = row.id, error = %err, "job failed");
                    if let Err(err) = queries::jobs::fail(&pool, row.id, &err.to_string()).await {
                        error!(job_id = row.id, error = %err, "recording job failure failed");
                    }
                }
            }
        }
    }
}

/// Run one job to completion. `Ok` covers handled failures too (stopped
/// channel, re-queued retry); `Err` means the job row itself should be
/// marked failed.
pub async fn execute(ctx: &CrawlContext, job: CrawlJob) -> Result<(), CrawlError> {
    match job {
        CrawlJob::Refresh { peer, attempt } => refresh(ctx, peer, attempt).await,
        CrawlJob::HistoryPage {
            peer,
            start_offset,
            end_offset,
            attempt,
        } => history_page(ctx, peer, start_offset, end_offset, attempt).await,
        CrawlJob::PublishRetry {
            queue,
            items,
            attempt,
        } => publish_retry(ctx, queue, items, attempt).await,
    }
}

async fn refresh(ctx: &CrawlContext, peer: PeerChannel, attempt: u32) -> Result<(), CrawlError> {
    match channel::sync(ctx, &peer).await {
        Ok(outcome) => {
            info!(
                channel_id = peer.channel_id,
                offset = outcome.offset,
                chained = outcome.chained,
                "refresh complete"
            );
            Ok(())
        }
        Err(err) if err.is_fatal_for_channel() => {
            error!(
                channel_id = peer.channel_id,
                error = %err,
                "stopping channel after fatal refresh error"
            );
            stop_channel(ctx, peer.channel_id, &err).await
        }
        Err(err) if err.is_transient() => {
            let next = attempt + 1;
            if ctx.cfg.metadata_retry.exhausted(next) {
                error!(
                    channel_id = peer.channel_id,
                    attempt,
                    error = %err,
                    "refresh retries exhausted"
                );
                Err(err)
            } else {
                warn!(
                    channel_id = peer.channel_id,
                    attempt = next,
                    error = %err,
                    "refresh failed, retrying"
                );
                ctx.jobs
                    .submit(
                        CrawlJob::Refresh {
                            peer,
                            attempt: next,
                        },
                        ctx.cfg.metadata_retry.delay(next),
                    )
                    .await
            }
        }
        Err(err) => Err(err),
    }
}

async fn history_page(
    ctx: &CrawlContext,
    peer: PeerChannel,
    start_offset: i64,
    end_offset: i64,
    attempt: u32,
) -> Result<(), CrawlError> {
    // A chain can outlive a deregistration; links for a stopped channel are
    // dropped rather than fetched.
    let Some(schedule) = ctx.store.get(peer.channel_id).await? else {
        warn!(
            channel_id = peer.channel_id,
            "chain link for unknown channel, dropping"
        );
        return Ok(());
    };
    if !schedule.running {
        info!(
            channel_id = peer.channel_id,
            "channel stopped, dropping chain link"
        );
        return Ok(());
    }

    match history::fetch_page(ctx, &peer, start_offset, end_offset).await {
        Ok(next) => {
            match next {
                Some(cursor) if chain::should_continue(Some(cursor), end_offset) => {
                    ctx.jobs
                        .submit(
                            CrawlJob::HistoryPage {
                                peer,
                                start_offset: cursor,
                                end_offset,
                                attempt: 0,
                            },
                            Duration::ZERO,
                        )
                        .await?;
                }
                _ => {
                    debug!(channel_id = peer.channel_id, end_offset, "chain complete");
                }
            }
            Ok(())
        }
        Err(err) if err.is_fatal_for_channel() => {
            error!(
                channel_id = peer.channel_id,
                start_offset,
                error = %err,
                "stopping channel after fatal page error"
            );
            stop_channel(ctx, peer.channel_id, &err).await
        }
        Err(err) if err.is_transient() => {
            let next = attempt + 1;
            if ctx.cfg.page_retry.exhausted(next) {
                error!(
                    channel_id = peer.channel_id,
                    start_offset,
                    attempt,
                    error = %err,
                    "page retries exhausted"
                );
                Err(err)
            } else {
                warn!(
                    channel_id = peer.channel_id,
                    start_offset,
                    attempt = next,
                    error = %err,
                    "page fetch failed, retrying link"
                );
                ctx.jobs
                    .submit(
                        CrawlJob::HistoryPage {
                            peer,
                            start_offset,
                            end_offset,
                            attempt: next,
                        },
                        ctx.cfg.page_retry.delay(next),
                    )
                    .await
            }
        }
        Err(err) => Err(err),
    }
}

async fn publish_retry(
    ctx: &CrawlContext,
    queue: String,
    items: Vec<serde_json::Value>,
    attempt: u32,
) -> Result<(), CrawlError> {
    let Some(broker) = &ctx.broker else {
        warn!(queue, "publish retry with no broker configured, dropping");
        return Ok(());
    };
    let publisher = Publisher {
        broker: broker.as_ref(),
        jobs: ctx.jobs.as_ref(),
        retry: &ctx.cfg.page_retry,
    };
    publisher.publish_many(&queue, items, attempt).await
}

/// A stop can race a deregistration that already removed the schedule, so a
/// missing row is not an error here.
async fn stop_channel(ctx: &CrawlContext, channel_id: i64, err: &CrawlError) -> Result<(), CrawlError> {
    match ctx
        .store
        .mark_stopped(channel_id, Some(&err.to_string()))
        .await
    {
        Ok(()) | Err(CrawlError::NotFound(_)) => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use trawler_core::config::CrawlConfig;
    use trawler_crawler::testing::{
        schedule_fixture, MemoryBroker, MemoryJobs, MemoryStore, ScriptedQuery,
    };

    const CHANNEL_ID: i64 = 10;

    fn peer() -> PeerChannel {
        PeerChannel {
            channel_id: CHANNEL_ID,
            access_hash: Some(7),
        }
    }

    struct Harness {
        query: Arc<ScriptedQuery>,
        store: Arc<MemoryStore>,
        broker: Arc<MemoryBroker>,
        jobs: Arc<MemoryJobs>,
        ctx: CrawlContext,
    }

    fn harness(store: MemoryStore) -> Harness {
        let query = Arc::new(ScriptedQuery::new());
        let store = Arc::new(store);
        let broker = Arc::new(MemoryBroker::new());
        let jobs = Arc::new(MemoryJobs::new());
        let ctx = CrawlContext {
            query: query.clone(),
            store: store.clone(),
            broker: Some(broker.clone()),
            jobs: jobs.clone(),
            cfg: CrawlConfig::for_tests(),
        };
        Harness {
            query,
            store,
            broker,
            jobs,
            ctx,
        }
    }

    fn cached_schedule(offset: i64, pts: Option<i64>) -> trawler_core::types::ChannelSchedule {
        let mut schedule = schedule_fixture(CHANNEL_ID, offset, pts);
        schedule.title = Some("News".to_string());
        schedule.username = Some("news".to_string());
        schedule.participants_count = Some(500);
        schedule.about = Some("daily".to_string());
        schedule
    }

    fn full_channel(pts: i64) -> serde_json::Value {
        json!({
            "full_chat": {"pts": pts, "about": "daily", "participants_count": 500},
            "chats": [{"id": CHANNEL_ID, "title": "News", "username": "news"}]
        })
    }

    fn page(ids: impl Iterator<Item = i64>) -> serde_json::Value {
        let messages: Vec<_> = ids.map(|id| json!({"id": id})).collect();
        json!({"messages": messages})
    }

    #[tokio::test]
    async fn fatal_refresh_error_stops_the_channel() {
        let h = harness(MemoryStore::with_schedule(cached_schedule(100, None)));
        h.query
            .push_full_channel(Err(CrawlError::remote("CHANNEL_INVALID")));

        execute(&h.ctx, CrawlJob::Refresh { peer: peer(), attempt: 0 })
            .await
            .unwrap();

        let schedule = h.store.schedule(CHANNEL_ID).unwrap();
        assert!(!schedule.running);
        assert_eq!(schedule.error.as_deref(), Some("CHANNEL_INVALID"));
        assert!(h.jobs.is_empty());
    }

    #[tokio::test]
    async fn transient_refresh_is_requeued() {
        let h = harness(MemoryStore::with_schedule(cached_schedule(100, None)));
        h.query
            .push_full_channel(Err(CrawlError::transient("gateway timeout")));

        execute(&h.ctx, CrawlJob::Refresh { peer: peer(), attempt: 0 })
            .await
            .unwrap();

        assert!(h.store.schedule(CHANNEL_ID).unwrap().running);
        match h.jobs.pop() {
            Some(CrawlJob::Refresh { attempt, .. }) => assert_eq!(attempt, 1),
            other => panic!("expected a refresh retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_refresh_retries_fail_the_job_not_the_channel() {
        let h = harness(MemoryStore::with_schedule(cached_schedule(100, None)));
        h.query
            .push_full_channel(Err(CrawlError::transient("gateway timeout")));

        let err = execute(&h.ctx, CrawlJob::Refresh { peer: peer(), attempt: 9 })
            .await
            .unwrap_err();

        assert!(err.is_transient());
        // The schedule keeps running; the next interval retries naturally.
        assert!(h.store.schedule(CHANNEL_ID).unwrap().running);
        assert!(h.jobs.is_empty());
    }

    #[tokio::test]
    async fn exhausted_page_retries_fail_the_job_not_the_channel() {
        let h = harness(MemoryStore::with_schedule(cached_schedule(130, None)));
        h.query
            .push_history(Err(CrawlError::transient("gateway timeout")));

        let err = execute(
            &h.ctx,
            CrawlJob::HistoryPage {
                peer: peer(),
                start_offset: 110,
                end_offset: 100,
                attempt: 19,
            },
        )
        .await
        .unwrap_err();

        assert!(err.is_transient());
        assert!(h.store.schedule(CHANNEL_ID).unwrap().running);
        assert!(h.jobs.is_empty());
    }

    #[tokio::test]
    async fn chain_link_resubmits_while_cursor_above_floor() {
        let h = harness(MemoryStore::with_schedule(cached_schedule(130, None)));
        h.query.push_history(Ok(page((110..=129).rev())));

        execute(
            &h.ctx,
            CrawlJob::HistoryPage {
                peer: peer(),
                start_offset: 130,
                end_offset: 100,
                attempt: 0,
            },
        )
        .await
        .unwrap();

        assert_eq!(h.broker.sent_to("messages").len(), 20);
        match h.jobs.pop() {
            Some(CrawlJob::HistoryPage {
                start_offset,
                end_offset,
                ..
            }) => {
                assert_eq!(start_offset, 110);
                assert_eq!(end_offset, 100);
            }
            other => panic!("expected the next chain link, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chain_link_for_stopped_channel_is_dropped() {
        let mut schedule = cached_schedule(130, None);
        schedule.running = false;
        let h = harness(MemoryStore::with_schedule(schedule));

        execute(
            &h.ctx,
            CrawlJob::HistoryPage {
                peer: peer(),
                start_offset: 130,
                end_offset: 100,
                attempt: 0,
            },
        )
        .await
        .unwrap();

        assert!(h.broker.sent_to("messages").is_empty());
        assert!(h.jobs.is_empty());
    }

    #[tokio::test]
    async fn transient_page_is_retried_with_same_bounds() {
        let h = harness(MemoryStore::with_schedule(cached_schedule(130, None)));
        h.query
            .push_history(Err(CrawlError::transient("gateway timeout")));

        execute(
            &h.ctx,
            CrawlJob::HistoryPage {
                peer: peer(),
                start_offset: 110,
                end_offset: 100,
                attempt: 2,
            },
        )
        .await
        .unwrap();

        match h.jobs.pop() {
            Some(CrawlJob::HistoryPage {
                start_offset,
                end_offset,
                attempt,
                ..
            }) => {
                assert_eq!(start_offset, 110);
                assert_eq!(end_offset, 100);
                assert_eq!(attempt, 3);
            }
            other => panic!("expected a link retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_retry_resumes_the_batch() {
        let h = harness(MemoryStore::new());
        let items = vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})];

        execute(
            &h.ctx,
            CrawlJob::PublishRetry {
                queue: "messages".to_string(),
                items: items.clone(),
                attempt: 1,
            },
        )
        .await
        .unwrap();

        assert_eq!(h.broker.sent_to("messages"), items);
        assert!(h.jobs.is_empty());
    }

    /// End-to-end chain: watermark 100, remote newest 130. Every message in
    /// `[100, 130)` comes out exactly once, nothing below the floor does, and
    /// the watermark lands on 130.
    #[tokio::test]
    async fn full_chain_covers_the_watermark_interval() {
        let h = harness(MemoryStore::with_schedule(cached_schedule(100, Some(3))));
        h.query.push_full_channel(Ok(full_channel(4)));
        h.query.push_history(Ok(page(std::iter::once(130))));
        h.query.push_history(Ok(page((110..=129).rev())));
        h.query.push_history(Ok(page((90..=109).rev())));

        execute(&h.ctx, CrawlJob::Refresh { peer: peer(), attempt: 0 })
            .await
            .unwrap();
        while let Some(job) = h.jobs.pop() {
            execute(&h.ctx, job).await.unwrap();
        }

        let sent: Vec<i64> = h
            .broker
            .sent_to("messages")
            .iter()
            .map(|v| v["id"].as_i64().unwrap())
            .collect();
        let expected: Vec<i64> = (100..=129).rev().collect();
        assert_eq!(sent, expected);
        assert_eq!(h.store.schedule(CHANNEL_ID).unwrap().offset, 130);
        assert!(h.jobs.is_empty());
    }
}

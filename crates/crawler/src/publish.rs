//! Resumable publication: one broker send per item, in order, with the
//! unpublished remainder handed off as a new retryable unit on transient
//! broker failure. The resume point is purely the count of successful sends
//! in this invocation — broker or consumer state is never re-checked, so
//! already-acknowledged items are never re-sent across a publisher-side
//! failure.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use trawler_core::error::CrawlError;
use trawler_core::ports::{Broker, JobSink};
use trawler_core::retry::RetryPolicy;
use trawler_core::types::CrawlJob;

pub struct Publisher<'a> {
    pub broker: &'a dyn Broker,
    pub jobs: &'a dyn JobSink,
    pub retry: &'a RetryPolicy,
}

impl Publisher<'_> {
    /// `attempt` counts publish hand-offs for this batch: 0 on first
    /// publication, incremented on each remainder re-submission.
    pub async fn publish_many(
        &self,
        queue: &str,
        items: Vec<Value>,
        attempt: u32,
    ) -> Result<(), CrawlError> {
        let total = items.len();
        for (sent, item) in items.iter().enumerate() {
            let payload = serde_json::to_vec(item)
                .map_err(|err| CrawlError::malformed(format!("encode entity: {err}")))?;

            match self.broker.publish(queue, &payload).await {
                Ok(()) => {}
                Err(err) if err.is_transient() => {
                    let next_attempt = attempt + 1;
                    if self.retry.exhausted(next_attempt) {
                        return Err(err);
                    }
                    warn!(
                        queue,
                        sent,
                        total,
                        attempt,
                        error = %err,
                        "broker send failed, handing off unpublished remainder"
                    );
                    self.jobs
                        .submit(
                            CrawlJob::PublishRetry {
                                queue: queue.to_string(),
                                items: items[sent..].to_vec(),
                                attempt: next_attempt,
                            },
                            self.retry.delay(next_attempt),
                        )
                        .await?;
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// Serialize entities for the queue payloads.
pub fn to_items<T: Serialize>(entities: &[T]) -> Result<Vec<Value>, CrawlError> {
    entities
        .iter()
        .map(|entity| {
            serde_json::to_value(entity)
                .map_err(|err| CrawlError::malformed(format!("encode entity: {err}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryBroker, MemoryJobs};
    use serde_json::json;

    fn items(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"id": i})).collect()
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(20, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn publishes_all_items_in_order() {
        let broker = MemoryBroker::new();
        let jobs = MemoryJobs::new();
        let retry = retry();
        let publisher = Publisher {
            broker: &broker,
            jobs: &jobs,
            retry: &retry,
        };

        publisher
            .publish_many("messages", items(3), 0)
            .await
            .unwrap();

        assert_eq!(broker.sent_to("messages"), items(3));
        assert_eq!(jobs.len(), 0);
    }

    #[tokio::test]
    async fn failure_after_k_hands_off_exact_remainder() {
        let broker = MemoryBroker::new();
        broker.fail_after(2);
        let jobs = MemoryJobs::new();
        let retry = retry();
        let publisher = Publisher {
            broker: &broker,
            jobs: &jobs,
            retry: &retry,
        };

        publisher
            .publish_many("messages", items(5), 0)
            .await
            .unwrap();

        assert_eq!(broker.sent_to("messages"), items(5)[..2].to_vec());
        match jobs.pop() {
            Some(CrawlJob::PublishRetry {
                queue,
                items: remainder,
                attempt,
            }) => {
                assert_eq!(queue, "messages");
                assert_eq!(remainder, items(5)[2..].to_vec());
                assert_eq!(attempt, 1);
            }
            other => panic!("expected a publish retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_ceiling_surfaces_the_failure() {
        let broker = MemoryBroker::new();
        broker.fail_after(0);
        let jobs = MemoryJobs::new();
        let retry = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        let publisher = Publisher {
            broker: &broker,
            jobs: &jobs,
            retry: &retry,
        };

        let err = publisher
            .publish_many("messages", items(2), 2)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(jobs.len(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let broker = MemoryBroker::new();
        let jobs = MemoryJobs::new();
        let retry = retry();
        let publisher = Publisher {
            broker: &broker,
            jobs: &jobs,
            retry: &retry,
        };

        publisher.publish_many("users", Vec::new(), 0).await.unwrap();
        assert!(broker.sent_to("users").is_empty());
    }
}

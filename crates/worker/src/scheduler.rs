//! Turns due schedules into refresh jobs. `claim_due` re-arms a schedule's
//! next trigger in the same statement that claims it, so a channel has at
//! most one refresh in flight no matter how many scheduler replicas run.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, error};

use trawler_core::config::Settings;
use trawler_core::ports::JobSink;
use trawler_core::types::{ChannelSchedule, CrawlJob};
use trawler_db::queries;

pub async fn run(pool: PgPool, jobs: Arc<dyn JobSink>, settings: Settings) -> anyhow::Result<()> {
    let poll = Duration::from_millis(settings.poll_interval_ms);
    loop {
        match queries::schedules::claim_due(&pool, settings.worker_batch_size).await {
            Ok(due) => {
                for row in due {
                    let schedule: ChannelSchedule = row.into();
                    let peer = schedule.peer();
                    debug!(channel_id = peer.channel_id, "schedule due, queueing refresh");
                    if let Err(err) = jobs
                        .submit(CrawlJob::Refresh { peer, attempt: 0 }, Duration::ZERO)
                        .await
                    {
                        error!(
                            channel_id = peer.channel_id,
                            error = %err,
                            "failed to queue refresh"
                        );
                    }
                }
            }
            Err(err) => error!(error = %err, "claiming due schedules failed"),
        }
        tokio::time::sleep(poll).await;
    }
}

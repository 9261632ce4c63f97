//! One metadata-sync pass for a channel: fetch, normalize, change-detect,
//! gate on `pts`, and seed the history chain when new messages exist.

use std::time::Duration;

use tracing::info;

use trawler_core::error::CrawlError;
use trawler_core::types::{Channel, ChannelSchedule, CrawlJob, NewSchedule, PeerChannel};

use crate::normalize;
use crate::publish::{to_items, Publisher};
use crate::CrawlContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The watermark after this pass.
    pub offset: i64,
    /// Whether a history chain was seeded.
    pub chained: bool,
}

/// Run one sync pass. `RemoteFetch` and `MalformedResponse` propagate to the
/// orchestration loop, which stops the channel; everything persisted here
/// only ever moves the schedule forward.
pub async fn sync(ctx: &CrawlContext, peer: &PeerChannel) -> Result<SyncOutcome, CrawlError> {
    let raw = ctx.query.get_full_channel(peer).await?;
    let (pts, channel) = normalize::channel_info(&raw, peer.channel_id)?;

    let (schedule, first_run) = match ctx.store.get(peer.channel_id).await? {
        Some(schedule) => (schedule, false),
        None => {
            let schedule = ctx
                .store
                .create(NewSchedule {
                    channel_id: peer.channel_id,
                    access_hash: peer.access_hash,
                    refresh_interval: ctx.cfg.refresh_interval_default,
                })
                .await?;
            (schedule, true)
        }
    };

    if first_run || metadata_changed(&schedule, &channel) {
        if let Some(broker) = &ctx.broker {
            let publisher = Publisher {
                broker: broker.as_ref(),
                jobs: ctx.jobs.as_ref(),
                retry: &ctx.cfg.page_retry,
            };
            publisher
                .publish_many(
                    &ctx.cfg.channels_queue,
                    to_items(std::slice::from_ref(&channel))?,
                    0,
                )
                .await?;
        }
        ctx.store.update_metadata(peer.channel_id, &channel).await?;
    }

    if let (Some(fresh), Some(prior)) = (pts, schedule.pts) {
        if fresh <= prior {
            info!(
                channel_id = peer.channel_id,
                pts = fresh,
                "channel has not changed since last run"
            );
            return Ok(SyncOutcome {
                offset: schedule.offset,
                chained: false,
            });
        }
    }
    if let Some(fresh) = pts {
        ctx.store.update_pts(peer.channel_id, fresh).await?;
    }

    let Some(new_offset) = newest_offset(ctx, peer).await? else {
        info!(channel_id = peer.channel_id, "channel has no messages");
        return Ok(SyncOutcome {
            offset: schedule.offset,
            chained: false,
        });
    };

    // The watermark as it stood before this pass; it becomes the floor the
    // pagination chain filters against.
    let previous = schedule.offset;
    if !first_run && previous >= new_offset {
        info!(
            channel_id = peer.channel_id,
            offset = previous,
            "no new messages on channel since last run"
        );
        return Ok(SyncOutcome {
            offset: previous,
            chained: false,
        });
    }

    ctx.store.advance_offset(peer.channel_id, new_offset).await?;
    ctx.jobs
        .submit(
            CrawlJob::HistoryPage {
                peer: *peer,
                start_offset: new_offset,
                end_offset: previous,
                attempt: 0,
            },
            Duration::ZERO,
        )
        .await?;
    info!(
        channel_id = peer.channel_id,
        start_offset = new_offset,
        end_offset = previous,
        "seeded history chain"
    );

    Ok(SyncOutcome {
        offset: new_offset,
        chained: true,
    })
}

/// A 1-item history call: the id of the channel's newest message, or `None`
/// for an empty channel.
async fn newest_offset(ctx: &CrawlContext, peer: &PeerChannel) -> Result<Option<i64>, CrawlError> {
    let raw = ctx.query.get_history(peer, 0, 1).await?;
    let page = normalize::history_page(&raw, peer.channel_id)?;
    Ok(page.messages.iter().map(|m| m.id).max())
}

fn metadata_changed(schedule: &ChannelSchedule, channel: &Channel) -> bool {
    schedule.title != channel.title
        || schedule.username != channel.username
        || schedule.participants_count != channel.participants_count
        || schedule.about != channel.about
}

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{ApiResult, AppError};
use crate::state::AppState;
use trawler_core::ports::ScheduleStore;
use trawler_core::types::{ChannelSchedule, NewSchedule, PeerChannel};
use trawler_crawler::channel;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/channels", post(register_channel))
        .route("/channels/{id}", get(get_channel).put(stop_channel))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterChannelRequest {
    channel_id: i64,
    access_hash: Option<i64>,
    refresh_interval: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatusResponse {
    channel_id: i64,
    running: bool,
    offset: i64,
    pts: Option<i64>,
    refresh_interval: i64,
    title: Option<String>,
    username: Option<String>,
    participants_count: Option<i64>,
    about: Option<String>,
    error: Option<String>,
    next_run_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChannelSchedule> for ChannelStatusResponse {
    fn from(schedule: ChannelSchedule) -> Self {
        ChannelStatusResponse {
            channel_id: schedule.channel_id,
            running: schedule.running,
            offset: schedule.offset,
            pts: schedule.pts,
            refresh_interval: schedule.refresh_interval,
            title: schedule.title,
            username: schedule.username,
            participants_count: schedule.participants_count,
            about: schedule.about,
            error: schedule.error,
            next_run_at: schedule.next_run_at,
            updated_at: schedule.updated_at,
        }
    }
}

/// Register a channel for crawling, or resume one that was stopped. The
/// first crawl pass runs inline so the caller learns immediately whether
/// the channel is reachable; recurring passes are the scheduler's job.
async fn register_channel(
    State(state): State<AppState>,
    Json(payload): Json<RegisterChannelRequest>,
) -> ApiResult<Json<ChannelStatusResponse>> {
    if payload.refresh_interval.is_some_and(|interval| interval <= 0) {
        return Err(AppError::BadRequest(
            "refreshInterval must be positive".to_string(),
        ));
    }

    let store = &state.ctx.store;
    let schedule = ensure_schedule(
        store.as_ref(),
        &payload,
        state.ctx.cfg.refresh_interval_default,
    )
    .await?;

    let peer = PeerChannel {
        channel_id: schedule.channel_id,
        access_hash: payload.access_hash.or(schedule.access_hash),
    };
    if let Err(err) = channel::sync(&state.ctx, &peer).await {
        error!(channel_id = peer.channel_id, error = %err, "first crawl pass failed");
        if err.is_fatal_for_channel() {
            store
                .mark_stopped(peer.channel_id, Some(&err.to_string()))
                .await?;
        }
        return Err(err.into());
    }

    let schedule = store
        .get(peer.channel_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("channel {} not found", peer.channel_id)))?;
    Ok(Json(schedule.into()))
}

/// A running channel cannot be registered twice: a second registration would
/// re-arm its trigger and race the scheduler's in-flight pass. Only a stopped
/// schedule is resumed; anything else is created fresh.
async fn ensure_schedule(
    store: &dyn ScheduleStore,
    payload: &RegisterChannelRequest,
    default_interval: i64,
) -> Result<ChannelSchedule, AppError> {
    match store.get(payload.channel_id).await? {
        Some(existing) if existing.running => {
            Err(AppError::BadRequest("channel already exists".to_string()))
        }
        Some(existing) => {
            let interval = payload.refresh_interval.unwrap_or(existing.refresh_interval);
            Ok(store.resume(payload.channel_id, interval).await?)
        }
        None => Ok(store
            .create(NewSchedule {
                channel_id: payload.channel_id,
                access_hash: payload.access_hash,
                refresh_interval: payload.refresh_interval.unwrap_or(default_interval),
            })
            .await?),
    }
}

async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ChannelStatusResponse>> {
    let schedule = state
        .ctx
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("channel {id} not found")))?;
    Ok(Json(schedule.into()))
}

/// Deregister: the schedule row stays behind with `running=false`, so a
/// later registration resumes from the same watermark.
async fn stop_channel(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ChannelStatusResponse>> {
    state.ctx.store.mark_stopped(id, None).await?;
    let schedule = state
        .ctx
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("channel {id} not found")))?;
    Ok(Json(schedule.into()))
}

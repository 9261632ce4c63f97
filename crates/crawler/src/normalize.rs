//! Pure conversion of raw query-service payloads into typed entities.
//!
//! The service answers either with structured JSON or, for channels still on
//! the old endpoint, with the page markup JSON-encoded as a bare string; the
//! string form is delegated to [`crate::legacy`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use trawler_core::error::CrawlError;
use trawler_core::types::{Channel, FwdFrom, Message, Peer, User};

use crate::legacy;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    /// Oldest message id in the page — the cursor for the next older page.
    /// Absent when the page is empty.
    pub next_offset: Option<i64>,
    pub messages: Vec<Message>,
    pub channels: Vec<Channel>,
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
struct RawFullChannel {
    #[serde(default)]
    pts: Option<i64>,
    #[serde(default)]
    full_chat: Option<RawFullChat>,
    #[serde(default)]
    chats: Vec<RawChat>,
}

#[derive(Debug, Deserialize)]
struct RawFullChat {
    #[serde(default)]
    pts: Option<i64>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    participants_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
    #[serde(default)]
    access_hash: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    participants_count: Option<i64>,
    #[serde(default)]
    about: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    #[serde(default)]
    messages: Vec<RawMessage>,
    #[serde(default)]
    chats: Vec<RawChat>,
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    date: Option<i64>,
    #[serde(default)]
    views: Option<i64>,
    #[serde(default)]
    forwards: Option<i64>,
    #[serde(default)]
    peer_id: Option<RawPeerRef>,
    #[serde(default)]
    from_id: Option<RawPeerRef>,
    #[serde(default)]
    fwd_from: Option<RawFwd>,
}

/// Origin reference: the service marks channel vs user origin by which id
/// field is present. A record with neither resolves to no origin.
#[derive(Debug, Deserialize)]
struct RawPeerRef {
    #[serde(default)]
    channel_id: Option<i64>,
    #[serde(default)]
    user_id: Option<i64>,
}

impl RawPeerRef {
    fn resolve(&self) -> Option<Peer> {
        if let Some(channel_id) = self.channel_id {
            return Some(Peer::Channel { channel_id });
        }
        self.user_id.map(|user_id| Peer::User { user_id })
    }
}

#[derive(Debug, Deserialize)]
struct RawFwd {
    #[serde(default)]
    date: Option<i64>,
    #[serde(default)]
    channel_post: Option<i64>,
    #[serde(default)]
    from_id: Option<RawPeerRef>,
}

/// Normalize a channel-info payload to `(pts, Channel)`. `channel_id` is the
/// peer being crawled, used to pick its record out of the referenced chats
/// and to label legacy pages that carry no id of their own.
pub fn channel_info(raw: &Value, channel_id: i64) -> Result<(Option<i64>, Channel), CrawlError> {
    if let Value::String(html) = raw {
        return legacy::channel_info(html, channel_id);
    }

    let parsed: RawFullChannel = serde_json::from_value(raw.clone())
        .map_err(|err| CrawlError::malformed(format!("channel info payload: {err}")))?;

    let full = parsed.full_chat;
    let pts = full.as_ref().and_then(|f| f.pts).or(parsed.pts);

    let mut chats = parsed.chats;
    let position = chats.iter().position(|c| c.id == channel_id).unwrap_or(0);
    if chats.is_empty() {
        return Err(CrawlError::malformed("channel info payload missing chats"));
    }
    let chat = chats.swap_remove(position);

    let channel = Channel {
        channel_id: chat.id,
        access_hash: chat.access_hash,
        title: chat.title,
        username: chat.username,
        participants_count: full
            .as_ref()
            .and_then(|f| f.participants_count)
            .or(chat.participants_count),
        about: full.and_then(|f| f.about).or(chat.about),
    };

    Ok((pts, channel))
}

/// Normalize a message-history payload. Pagination walks backward, so the
/// continuation cursor is the oldest id seen in the page.
pub fn history_page(raw: &Value, channel_id: i64) -> Result<HistoryPage, CrawlError> {
    if let Value::String(html) = raw {
        return legacy::history_page(html, channel_id);
    }

    let parsed: RawHistory = serde_json::from_value(raw.clone())
        .map_err(|err| CrawlError::malformed(format!("history payload: {err}")))?;

    let messages: Vec<Message> = parsed
        .messages
        .into_iter()
        .map(|m| Message {
            id: m.id,
            message: m.message,
            date: m.date.and_then(timestamp),
            views: m.views,
            forwards: m.forwards,
            channel_id: m
                .peer_id
                .as_ref()
                .and_then(|p| p.channel_id)
                .unwrap_or(channel_id),
            from_peer: m.from_id.as_ref().and_then(RawPeerRef::resolve),
            fwd_from: m.fwd_from.map(|f| FwdFrom {
                date: f.date.and_then(timestamp),
                channel_post: f.channel_post,
                from_peer: f.from_id.as_ref().and_then(RawPeerRef::resolve),
            }),
        })
        .collect();

    let channels = parsed
        .chats
        .into_iter()
        .map(|c| Channel {
            channel_id: c.id,
            access_hash: c.access_hash,
            title: c.title,
            username: c.username,
            participants_count: c.participants_count,
            about: c.about,
        })
        .collect();

    let users = parsed
        .users
        .into_iter()
        .map(|u| User {
            id: u.id,
            access_hash: u.access_hash,
            first_name: u.first_name,
            last_name: u.last_name,
            username: u.username,
            phone: u.phone,
        })
        .collect();

    let next_offset = messages.iter().map(|m| m.id).min();

    Ok(HistoryPage {
        next_offset,
        messages,
        channels,
        users,
    })
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    #[serde(default)]
    access_hash: Option<i64>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

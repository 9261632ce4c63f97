//! In-memory fakes for the collaborator ports, used by this crate's tests
//! and by the worker's orchestration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use trawler_core::error::CrawlError;
use trawler_core::ports::{Broker, JobSink, QueryService, ScheduleStore};
use trawler_core::types::{
    Channel, ChannelSchedule, CrawlJob, Message, NewSchedule, PeerChannel,
};

pub fn schedule_fixture(channel_id: i64, offset: i64, pts: Option<i64>) -> ChannelSchedule {
    let now = Utc::now();
    ChannelSchedule {
        channel_id,
        access_hash: None,
        refresh_interval: 45,
        offset,
        pts,
        running: true,
        error: None,
        title: None,
        username: None,
        participants_count: None,
        about: None,
        next_run_at: now,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    schedules: Mutex<HashMap<i64, ChannelSchedule>>,
    written: Mutex<Vec<Message>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule(schedule: ChannelSchedule) -> Self {
        let store = Self::new();
        store
            .schedules
            .lock()
            .expect("lock")
            .insert(schedule.channel_id, schedule);
        store
    }

    pub fn schedule(&self, channel_id: i64) -> Option<ChannelSchedule> {
        self.schedules.lock().expect("lock").get(&channel_id).cloned()
    }

    pub fn written(&self) -> Vec<Message> {
        self.written.lock().expect("lock").clone()
    }

    fn update<F>(&self, channel_id: i64, apply: F) -> Result<(), CrawlError>
    where
        F: FnOnce(&mut ChannelSchedule),
    {
        let mut schedules = self.schedules.lock().expect("lock");
        let schedule = schedules
            .get_mut(&channel_id)
            .ok_or(CrawlError::NotFound(channel_id))?;
        apply(schedule);
        schedule.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn get(&self, channel_id: i64) -> Result<Option<ChannelSchedule>, CrawlError> {
        Ok(self.schedule(channel_id))
    }

    async fn create(&self, new: NewSchedule) -> Result<ChannelSchedule, CrawlError> {
        let mut schedule = schedule_fixture(new.channel_id, 1, None);
        schedule.access_hash = new.access_hash;
        schedule.refresh_interval = new.refresh_interval;
        self.schedules
            .lock()
            .expect("lock")
            .insert(new.channel_id, schedule.clone());
        Ok(schedule)
    }

    async fn resume(
        &self,
        channel_id: i64,
        refresh_interval: i64,
    ) -> Result<ChannelSchedule, CrawlError> {
        self.update(channel_id, |s| {
            s.running = true;
            s.error = None;
            s.refresh_interval = refresh_interval;
        })?;
        self.schedule(channel_id).ok_or(CrawlError::NotFound(channel_id))
    }

    async fn update_metadata(&self, channel_id: i64, channel: &Channel) -> Result<(), CrawlError> {
        self.update(channel_id, |s| {
            s.title = channel.title.clone();
            s.username = channel.username.clone();
            s.participants_count = channel.participants_count;
            s.about = channel.about.clone();
        })
    }

    async fn update_pts(&self, channel_id: i64, pts: i64) -> Result<(), CrawlError> {
        self.update(channel_id, |s| s.pts = Some(s.pts.unwrap_or(0).max(pts)))
    }

    async fn advance_offset(&self, channel_id: i64, offset: i64) -> Result<(), CrawlError> {
        self.update(channel_id, |s| s.offset = s.offset.max(offset))
    }

    async fn mark_stopped(&self, channel_id: i64, error: Option<&str>) -> Result<(), CrawlError> {
        self.update(channel_id, |s| {
            s.running = false;
            s.error = error.map(str::to_string);
        })
    }

    async fn add_messages(&self, _channel_id: i64, messages: &[Message]) -> Result<(), CrawlError> {
        self.written.lock().expect("lock").extend_from_slice(messages);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBroker {
    sent: Mutex<Vec<(String, Value)>>,
    /// Fail once the total successful send count reaches this value, then
    /// behave normally again.
    fail_at: Mutex<Option<usize>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_after(&self, successful_sends: usize) {
        *self.fail_at.lock().expect("lock") = Some(successful_sends);
    }

    pub fn sent_to(&self, queue: &str) -> Vec<Value> {
        self.sent
            .lock()
            .expect("lock")
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), CrawlError> {
        let mut sent = self.sent.lock().expect("lock");
        let mut fail_at = self.fail_at.lock().expect("lock");
        if let Some(limit) = *fail_at {
            if sent.len() >= limit {
                *fail_at = None;
                return Err(CrawlError::transient("broker connection lost"));
            }
        }
        let value = serde_json::from_slice(payload).unwrap_or(Value::Null);
        sent.push((queue.to_string(), value));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryJobs {
    queue: Mutex<VecDeque<CrawlJob>>,
}

impl MemoryJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<CrawlJob> {
        self.queue.lock().expect("lock").pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobSink for MemoryJobs {
    async fn submit(&self, job: CrawlJob, _delay: Duration) -> Result<(), CrawlError> {
        self.queue.lock().expect("lock").push_back(job);
        Ok(())
    }
}

/// Canned query-service responses, consumed in order per method.
#[derive(Default)]
pub struct ScriptedQuery {
    full_channel: Mutex<VecDeque<Result<Value, CrawlError>>>,
    history: Mutex<VecDeque<Result<Value, CrawlError>>>,
}

impl ScriptedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_full_channel(&self, response: Result<Value, CrawlError>) {
        self.full_channel.lock().expect("lock").push_back(response);
    }

    pub fn push_history(&self, response: Result<Value, CrawlError>) {
        self.history.lock().expect("lock").push_back(response);
    }
}

#[async_trait]
impl QueryService for ScriptedQuery {
    async fn get_full_channel(&self, _peer: &PeerChannel) -> Result<Value, CrawlError> {
        self.full_channel
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(CrawlError::transient("script exhausted")))
    }

    async fn get_history(
        &self,
        _peer: &PeerChannel,
        _offset_id: i64,
        _limit: u32,
    ) -> Result<Value, CrawlError> {
        self.history
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(CrawlError::transient("script exhausted")))
    }
}

use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    /// Broker connection. Absent switches the crawlers into legacy
    /// direct-write mode (messages land in the repository instead).
    pub redis_url: Option<String>,
    pub query_api_url: String,
    pub query_username: String,
    pub api_bind: String,
    pub worker_concurrency: usize,
    pub worker_batch_size: i64,
    pub poll_interval_ms: u64,
    pub refresh_interval_default: i64,
    pub page_limit: u32,
    pub channels_queue: String,
    pub messages_queue: String,
    pub users_queue: String,
    pub metadata_max_retries: u32,
    pub page_max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_jitter_ms: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let database_url =
            std::env::var("TRAWLER_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL"))?;
        let redis_url = std::env::var("TRAWLER_REDIS_URL")
            .or_else(|_| std::env::var("REDIS_URL"))
            .ok();
        let query_api_url = std::env::var("TRAWLER_QUERY_API_URL")?;
        let query_username = std::env::var("TRAWLER_QUERY_USERNAME").unwrap_or_default();
        let api_bind =
            std::env::var("TRAWLER_API_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let worker_concurrency = env_parse("TRAWLER_WORKER_CONCURRENCY", 4);
        let worker_batch_size = env_parse("TRAWLER_WORKER_BATCH_SIZE", 10);
        let poll_interval_ms = env_parse("TRAWLER_POLL_INTERVAL_MS", 1000);
        let refresh_interval_default = env_parse("TRAWLER_REFRESH_INTERVAL", 45);
        let page_limit = env_parse("TRAWLER_PAGE_LIMIT", 100);
        let channels_queue =
            std::env::var("TRAWLER_CHANNELS_QUEUE").unwrap_or_else(|_| "channels".to_string());
        let messages_queue =
            std::env::var("TRAWLER_MESSAGES_QUEUE").unwrap_or_else(|_| "messages".to_string());
        let users_queue =
            std::env::var("TRAWLER_USERS_QUEUE").unwrap_or_else(|_| "users".to_string());
        let metadata_max_retries = env_parse("TRAWLER_METADATA_MAX_RETRIES", 10);
        let page_max_retries = env_parse("TRAWLER_PAGE_MAX_RETRIES", 20);
        let retry_base_ms = env_parse("TRAWLER_RETRY_BASE_MS", 500);
        let retry_jitter_ms = env_parse("TRAWLER_RETRY_JITTER_MS", 250);

        Ok(Self {
            database_url,
            redis_url,
            query_api_url,
            query_username,
            api_bind,
            worker_concurrency,
            worker_batch_size,
            poll_interval_ms,
            refresh_interval_default,
            page_limit,
            channels_queue,
            messages_queue,
            users_queue,
            metadata_max_retries,
            page_max_retries,
            retry_base_ms,
            retry_jitter_ms,
        })
    }

    /// The slice of settings the crawl engine takes at construction. Core
    /// logic never reads process-wide state.
    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            channels_queue: self.channels_queue.clone(),
            messages_queue: self.messages_queue.clone(),
            users_queue: self.users_queue.clone(),
            page_limit: self.page_limit,
            refresh_interval_default: self.refresh_interval_default,
            metadata_retry: RetryPolicy::new(
                self.metadata_max_retries,
                Duration::from_millis(self.retry_base_ms),
                Duration::from_millis(self.retry_jitter_ms),
            ),
            page_retry: RetryPolicy::new(
                self.page_max_retries,
                Duration::from_millis(self.retry_base_ms),
                Duration::from_millis(self.retry_jitter_ms),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub channels_queue: String,
    pub messages_queue: String,
    pub users_queue: String,
    pub page_limit: u32,
    pub refresh_interval_default: i64,
    pub metadata_retry: RetryPolicy,
    pub page_retry: RetryPolicy,
}

impl CrawlConfig {
    /// Defaults used by tests and tooling; production values come from
    /// `Settings::crawl_config`.
    pub fn for_tests() -> Self {
        CrawlConfig {
            channels_queue: "channels".to_string(),
            messages_queue: "messages".to_string(),
            users_queue: "users".to_string(),
            page_limit: 100,
            refresh_interval_default: 45,
            metadata_retry: RetryPolicy::new(10, Duration::ZERO, Duration::ZERO),
            page_retry: RetryPolicy::new(20, Duration::ZERO, Duration::ZERO),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

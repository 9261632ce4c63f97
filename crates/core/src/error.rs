use thiserror::Error;

/// Failure kinds for a crawl pass.
///
/// `RemoteFetch` and `MalformedResponse` are fatal for the channel: retrying
/// reproduces them, so the orchestration loop stops the schedule instead.
/// `Transient` failures are retried with bounded, jittered backoff.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The remote query service reported failure for this channel via its
    /// error envelope. Carries the service-provided text verbatim.
    #[error("{0}")]
    RemoteFetch(String),

    #[error("transient i/o error: {0}")]
    Transient(String),

    #[error("no schedule found for channel {0}")]
    NotFound(i64),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CrawlError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        CrawlError::MalformedResponse(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        CrawlError::RemoteFetch(msg.into())
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        CrawlError::Transient(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        CrawlError::Storage(err.to_string())
    }

    /// Worth re-submitting with the same arguments.
    pub fn is_transient(&self) -> bool {
        matches!(self, CrawlError::Transient(_))
    }

    /// Stops the channel schedule when raised from a crawl pass.
    pub fn is_fatal_for_channel(&self) -> bool {
        matches!(
            self,
            CrawlError::RemoteFetch(_) | CrawlError::MalformedResponse(_)
        )
    }
}

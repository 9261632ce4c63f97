//! Outbound adapters: the HTTP query-service client and the redis broker.

mod broker;
mod query;

pub use broker::RedisBroker;
pub use query::HttpQueryService;

use async_trait::async_trait;
use serde_json::{json, Value};

use trawler_core::error::CrawlError;
use trawler_core::ports::QueryService;
use trawler_core::types::PeerChannel;

/// Client for the remote query service. Requests are a named-method
/// envelope posted as JSON; responses are JSON, with application-level
/// failure signalled by a discriminator field rather than an HTTP status.
pub struct HttpQueryService {
    http: reqwest::Client,
    api_url: String,
    username: String,
}

impl HttpQueryService {
    pub fn new(http: reqwest::Client, api_url: String, username: String) -> Self {
        Self {
            http,
            api_url,
            username,
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, CrawlError> {
        let body = json!({
            "args": { "method": method, "params": params },
            "username": self.username,
        });

        let response = self
            .http
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(CrawlError::transient)?
            .error_for_status()
            .map_err(CrawlError::transient)?;

        let value: Value = response.json().await.map_err(CrawlError::transient)?;
        decode_envelope(value)
    }

    fn input_peer(&self, peer: &PeerChannel, tag: &str) -> Value {
        json!({
            "_": tag,
            "channel_id": peer.channel_id,
            "access_hash": peer.access_hash,
        })
    }
}

/// The service reports its own failures inside a 200 response. Decode the
/// envelope before anything downstream sees the payload, so callers get a
/// `RemoteFetch` distinct from transport errors.
fn decode_envelope(value: Value) -> Result<Value, CrawlError> {
    if value.get("_").and_then(Value::as_str) == Some("error") {
        let text = value
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("unknown remote error");
        return Err(CrawlError::remote(text));
    }
    Ok(value)
}

#[async_trait]
impl QueryService for HttpQueryService {
    async fn get_full_channel(&self, peer: &PeerChannel) -> Result<Value, CrawlError> {
        self.call(
            "channels.getFullChannel",
            json!({ "channel": self.input_peer(peer, "inputChannel") }),
        )
        .await
    }

    async fn get_history(
        &self,
        peer: &PeerChannel,
        offset_id: i64,
        limit: u32,
    ) -> Result<Value, CrawlError> {
        self.call(
            "messages.getHistory",
            json!({
                "add_offset": 0,
                "hash": 0,
                "limit": limit,
                "max_id": 0,
                "min_id": 0,
                "offset_date": 0,
                "offset_id": offset_id,
                "peer": self.input_peer(peer, "inputPeerChannel"),
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_decodes_to_remote_fetch() {
        let err = decode_envelope(json!({"_": "error", "text": "CHANNEL_INVALID"})).unwrap_err();
        match err {
            CrawlError::RemoteFetch(text) => assert_eq!(text, "CHANNEL_INVALID"),
            other => panic!("expected RemoteFetch, got {other:?}"),
        }
    }

    #[test]
    fn error_envelope_without_text_gets_placeholder() {
        let err = decode_envelope(json!({"_": "error"})).unwrap_err();
        assert_eq!(err.to_string(), "unknown remote error");
    }

    #[test]
    fn plain_payload_passes_through() {
        let value = json!({"pts": 5, "chats": []});
        assert_eq!(decode_envelope(value.clone()).unwrap(), value);
    }

    #[test]
    fn non_error_discriminator_passes_through() {
        let value = json!({"_": "messages.messages", "messages": []});
        assert!(decode_envelope(value).is_ok());
    }
}

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use trawler_core::error::CrawlError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    UpstreamFailed(String),
    Internal,
}

impl From<CrawlError> for AppError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::NotFound(id) => AppError::NotFound(format!("channel {id} not found")),
            CrawlError::RemoteFetch(msg)
            | CrawlError::MalformedResponse(msg)
            | CrawlError::Transient(msg) => AppError::UpstreamFailed(msg),
            CrawlError::Storage(_) => AppError::Internal,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::UpstreamFailed(msg) => (StatusCode::BAD_GATEWAY, "upstream_failed", msg),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Unexpected error".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code: code.to_string(),
                    message,
                },
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    fn rt() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_bad_request_response() {
        rt().block_on(async {
            let err = AppError::BadRequest("refreshInterval must be positive".to_string());
            let response = err.into_response();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = to_bytes(response.into_body(), 1024).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

            assert_eq!(json["error"]["code"], "invalid_request");
            assert_eq!(json["error"]["message"], "refreshInterval must be positive");
        });
    }

    #[test]
    fn test_not_found_response() {
        rt().block_on(async {
            let err = AppError::NotFound("channel 42 not found".to_string());
            let response = err.into_response();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);

            let body = to_bytes(response.into_body(), 1024).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

            assert_eq!(json["error"]["code"], "not_found");
            assert_eq!(json["error"]["message"], "channel 42 not found");
        });
    }

    #[test]
    fn test_upstream_failure_response() {
        rt().block_on(async {
            let err = AppError::from(CrawlError::remote("CHANNEL_INVALID"));
            let response = err.into_response();

            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

            let body = to_bytes(response.into_body(), 1024).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

            assert_eq!(json["error"]["code"], "upstream_failed");
            assert_eq!(json["error"]["message"], "CHANNEL_INVALID");
        });
    }

    #[test]
    fn test_storage_error_is_opaque() {
        rt().block_on(async {
            let err = AppError::from(CrawlError::storage("connection refused"));
            let response = err.into_response();

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

            let body = to_bytes(response.into_body(), 1024).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

            assert_eq!(json["error"]["code"], "internal_error");
            assert_eq!(json["error"]["message"], "Unexpected error");
        });
    }

    #[test]
    fn test_not_found_conversion() {
        let err = AppError::from(CrawlError::NotFound(42));
        assert!(matches!(err, AppError::NotFound(msg) if msg == "channel 42 not found"));
    }
}

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::relay::RelayError;

pub const MISSING_URL_MESSAGE: &str = "Missing url parameter";
pub const INVALID_URL_MESSAGE: &str = "Invalid YouTube URL";
pub const SERVER_ERROR_MESSAGE: &str = "Server error";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: Option<&'static str>,
    pub retry_after_seconds: Option<u64>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: None,
            retry_after_seconds: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: None,
            retry_after_seconds: None,
        }
    }

    fn gateway_timeout(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: message.into(),
            code: Some(code),
            retry_after_seconds: None,
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(relay_error: RelayError) -> Self {
        match relay_error {
            RelayError::Upstream(message) => {
                warn!("Upstream rejected conversion: {message}");
                Self::internal(message)
            }
            RelayError::StillQueued {
                retries,
                retry_after,
            } => {
                warn!("Giving up on queued conversion after {retries} retries");
                Self {
                    retry_after_seconds: Some(retry_after.as_secs().max(1)),
                    ..Self::gateway_timeout(
                        "Conversion is still queued upstream. Try again shortly.",
                        "STILL_QUEUED",
                    )
                }
            }
            RelayError::DeadlineExceeded(deadline) => {
                warn!("Conversion exceeded the relay deadline of {deadline:?}");
                Self::gateway_timeout("Conversion timed out.", "CONVERSION_TIMEOUT")
            }
            RelayError::UpstreamStatus { status } => {
                error!(
                    "Download error: upstream API error: {}",
                    status.canonical_reason().unwrap_or(status.as_str())
                );
                Self::internal(SERVER_ERROR_MESSAGE)
            }
            other @ (RelayError::Transport(_) | RelayError::MalformedResponse(_)) => {
                error!("Download error: {other}");
                Self::internal(SERVER_ERROR_MESSAGE)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
        });

        let mut response = (self.status, body).into_response();
        if let Some(seconds) = self.retry_after_seconds
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}
